//! Capability-gated request surface.
//!
//! Every operation follows the same shape: refuse if the adapter or the
//! negotiated capabilities say the method is unavailable, make sure the
//! target document is open (transiently if needed), issue the request with
//! an operation-specific timeout, and normalize the raw result into the
//! shared `tether-types` shapes.
//!
//! An empty or null success response is not a failure — operations return
//! `None`/empty collections for it, distinct from [`Error::Unsupported`]
//! and [`Error::Timeout`].

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::config::OperationKind;
use crate::edits::{self, AppliedEdit};
use crate::error::{Error, Result};
use crate::protocol;
use crate::session::Session;
use tether_types::{
    CodeActionInfo, CompletionEntry, Diagnostic, HoverInfo, Location, Position, Range,
    SignatureHelpInfo, SymbolInfo, TextEdit, WorkspaceSymbolInfo,
};

/// Formatting preferences passed to `textDocument/formatting`.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

impl Session {
    fn check_supported(&self, op: OperationKind) -> Result<()> {
        if self.profile.declares_unsupported(op) || !self.capabilities.supports(op) {
            return Err(Error::unsupported(op.method()));
        }
        Ok(())
    }

    fn op_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.profile.operation_timeout())
    }

    /// Gate, transiently open, request, and clean up for one
    /// document-scoped operation.
    async fn document_request(
        &self,
        op: OperationKind,
        path: &Path,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.ensure_ready()?;
        self.check_supported(op)?;

        let opened_here = self.ensure_open(path).await?;
        let result = self
            .conn
            .request(op.method(), Some(params), self.op_timeout(timeout))
            .await;
        if opened_here {
            if let Err(e) = self.close_document(path).await {
                tracing::debug!("failed to close transiently opened document: {e}");
            }
        }
        result
    }

    /// Hover text at a position, or `None` when the server has nothing to
    /// say there.
    pub async fn hover(
        &self,
        path: &Path,
        position: Position,
        timeout: Option<Duration>,
    ) -> Result<Option<HoverInfo>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::position_params(uri.as_str(), position);
        let raw = self
            .document_request(OperationKind::Hover, path, params, timeout)
            .await?;
        Ok(protocol::hover_from_value(raw))
    }

    /// Definition sites for the symbol at a position.
    pub async fn definition(
        &self,
        path: &Path,
        position: Position,
        timeout: Option<Duration>,
    ) -> Result<Vec<Location>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::position_params(uri.as_str(), position);
        let raw = self
            .document_request(OperationKind::Definition, path, params, timeout)
            .await?;
        Ok(protocol::locations_from_value(raw))
    }

    /// Every reference to the symbol at a position.
    pub async fn references(
        &self,
        path: &Path,
        position: Position,
        include_declaration: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<Location>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::reference_params(uri.as_str(), position, include_declaration);
        let raw = self
            .document_request(OperationKind::References, path, params, timeout)
            .await?;
        Ok(protocol::locations_from_value(raw))
    }

    /// Document outline.
    pub async fn document_symbols(
        &self,
        path: &Path,
        timeout: Option<Duration>,
    ) -> Result<Vec<SymbolInfo>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::document_symbol_params(uri.as_str());
        let raw = self
            .document_request(OperationKind::DocumentSymbols, path, params, timeout)
            .await?;
        Ok(protocol::symbols_from_value(raw))
    }

    /// Workspace-wide symbol search. Not document-scoped, so no open is
    /// needed.
    pub async fn workspace_symbols(
        &self,
        query: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<WorkspaceSymbolInfo>> {
        self.ensure_ready()?;
        self.check_supported(OperationKind::WorkspaceSymbols)?;
        let raw = self
            .conn
            .request(
                OperationKind::WorkspaceSymbols.method(),
                Some(protocol::workspace_symbol_params(query)),
                self.op_timeout(timeout),
            )
            .await?;
        Ok(protocol::workspace_symbols_from_value(raw))
    }

    /// Completion candidates at a position.
    pub async fn completion(
        &self,
        path: &Path,
        position: Position,
        timeout: Option<Duration>,
    ) -> Result<Vec<CompletionEntry>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::position_params(uri.as_str(), position);
        let raw = self
            .document_request(OperationKind::Completion, path, params, timeout)
            .await?;
        Ok(protocol::completions_from_value(raw))
    }

    /// Signature help for the call at a position.
    pub async fn signature_help(
        &self,
        path: &Path,
        position: Position,
        timeout: Option<Duration>,
    ) -> Result<Option<SignatureHelpInfo>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::position_params(uri.as_str(), position);
        let raw = self
            .document_request(OperationKind::SignatureHelp, path, params, timeout)
            .await?;
        Ok(protocol::signature_help_from_value(raw))
    }

    /// Code actions available for a range.
    pub async fn code_actions(
        &self,
        path: &Path,
        range: Range,
        timeout: Option<Duration>,
    ) -> Result<Vec<CodeActionInfo>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::code_action_params(uri.as_str(), range);
        let raw = self
            .document_request(OperationKind::CodeActions, path, params, timeout)
            .await?;
        Ok(protocol::code_actions_from_value(raw))
    }

    /// Whole-document formatting edits. Returned, not applied.
    pub async fn format_document(
        &self,
        path: &Path,
        options: FormatOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<TextEdit>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params =
            protocol::formatting_params(uri.as_str(), options.tab_size, options.insert_spaces);
        let raw = self
            .document_request(OperationKind::Formatting, path, params, timeout)
            .await?;
        Ok(protocol::text_edits_from_value(raw))
    }

    /// Range formatting edits. Returned, not applied.
    pub async fn format_range(
        &self,
        path: &Path,
        range: Range,
        options: FormatOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<TextEdit>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::range_formatting_params(
            uri.as_str(),
            range,
            options.tab_size,
            options.insert_spaces,
        );
        let raw = self
            .document_request(OperationKind::RangeFormatting, path, params, timeout)
            .await?;
        Ok(protocol::text_edits_from_value(raw))
    }

    /// Whether the symbol at a position can be renamed, and over which
    /// range.
    pub async fn prepare_rename(
        &self,
        path: &Path,
        position: Position,
        timeout: Option<Duration>,
    ) -> Result<Option<Range>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::position_params(uri.as_str(), position);
        let raw = self
            .document_request(OperationKind::PrepareRename, path, params, timeout)
            .await?;
        Ok(protocol::prepare_rename_range(raw))
    }

    /// Rename the symbol at a position and commit the server's
    /// `WorkspaceEdit` to the affected files.
    ///
    /// `Ok(None)` means the server answered with no edit — nothing to
    /// rename at that position. That is deliberately distinct from
    /// `Unsupported` and `Timeout`.
    pub async fn rename(
        &self,
        path: &Path,
        position: Position,
        new_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<AppliedEdit>> {
        let uri = protocol::path_to_file_uri(path)?;
        let params = protocol::rename_params(uri.as_str(), position, new_name);
        let raw = self
            .document_request(OperationKind::Rename, path, params, timeout)
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        let groups = protocol::workspace_edit_from_value(&raw);
        if groups.is_empty() {
            return Ok(None);
        }
        let applied = edits::apply_workspace_edit(&groups, self.encoding).await?;
        tracing::debug!(
            files = applied.files.len(),
            edits = applied.edit_count,
            "applied workspace edit"
        );
        Ok(Some(applied))
    }

    /// Explicitly pull diagnostics for a document. The result also lands
    /// in the session's diagnostics cache.
    pub async fn pull_diagnostics(
        &self,
        path: &Path,
        timeout: Option<Duration>,
    ) -> Result<Vec<Diagnostic>> {
        self.ensure_ready()?;
        self.check_supported(OperationKind::PullDiagnostics)?;
        let uri = protocol::path_to_file_uri(path)?;

        let opened_here = self.ensure_open(path).await?;
        let content = {
            let docs = self.documents.lock().await;
            docs.content(uri.as_str()).map(String::from).unwrap_or_default()
        };
        let result = self.pull_once(uri.as_str(), self.op_timeout(timeout)).await;
        if opened_here {
            if let Err(e) = self.close_document(path).await {
                tracing::debug!("failed to close transiently opened document: {e}");
            }
        }

        let items = match result? {
            Some(items) => items,
            // Unchanged: whatever we had is still current.
            None => self.diagnostics.get(uri.as_str()).unwrap_or_default(),
        };
        Ok(crate::diagnostics::process_diagnostics(
            items,
            &content,
            &self.profile,
        ))
    }
}
