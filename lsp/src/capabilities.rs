//! Negotiated server capabilities.
//!
//! Captured once from the `initialize` response and read by the facade on
//! every call; never mutated after session start. Only the capability slots
//! this client gates on are modeled — anything else the server advertises
//! is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::config::OperationKind;

/// How the server encodes `character` offsets in positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionEncoding {
    Utf8,
    /// The protocol default.
    #[default]
    Utf16,
}

/// Immutable snapshot of the capabilities a server advertised.
///
/// Providers are loosely typed on the wire (`bool` or an options object);
/// a slot counts as supported unless it is absent or literally `false`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerCapabilities {
    hover_provider: Option<Value>,
    definition_provider: Option<Value>,
    references_provider: Option<Value>,
    rename_provider: Option<Value>,
    completion_provider: Option<Value>,
    signature_help_provider: Option<Value>,
    document_symbol_provider: Option<Value>,
    workspace_symbol_provider: Option<Value>,
    code_action_provider: Option<Value>,
    document_formatting_provider: Option<Value>,
    document_range_formatting_provider: Option<Value>,
    diagnostic_provider: Option<Value>,
    position_encoding: Option<String>,
}

fn enabled(slot: &Option<Value>) -> bool {
    match slot {
        None | Some(Value::Bool(false)) => false,
        Some(_) => true,
    }
}

impl ServerCapabilities {
    /// Whether the server advertises support for `op`.
    #[must_use]
    pub fn supports(&self, op: OperationKind) -> bool {
        match op {
            OperationKind::Hover => enabled(&self.hover_provider),
            OperationKind::Definition => enabled(&self.definition_provider),
            OperationKind::References => enabled(&self.references_provider),
            OperationKind::Rename => enabled(&self.rename_provider),
            // prepareRename is an opt-in flag inside renameProvider.
            OperationKind::PrepareRename => matches!(
                &self.rename_provider,
                Some(Value::Object(o)) if o.get("prepareProvider") == Some(&Value::Bool(true))
            ),
            OperationKind::Completion => enabled(&self.completion_provider),
            OperationKind::SignatureHelp => enabled(&self.signature_help_provider),
            OperationKind::DocumentSymbols => enabled(&self.document_symbol_provider),
            OperationKind::WorkspaceSymbols => enabled(&self.workspace_symbol_provider),
            OperationKind::CodeActions => enabled(&self.code_action_provider),
            OperationKind::Formatting => enabled(&self.document_formatting_provider),
            OperationKind::RangeFormatting => enabled(&self.document_range_formatting_provider),
            OperationKind::PullDiagnostics => enabled(&self.diagnostic_provider),
        }
    }

    /// The position encoding the server negotiated (UTF-16 unless the
    /// server explicitly chose UTF-8).
    #[must_use]
    pub fn position_encoding(&self) -> PositionEncoding {
        match self.position_encoding.as_deref() {
            Some("utf-8") => PositionEncoding::Utf8,
            _ => PositionEncoding::Utf16,
        }
    }
}
