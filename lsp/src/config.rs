//! Adapter configuration and server behavior profiles.
//!
//! An adapter (supplied by the preset registry, outside this crate) names
//! the server binary and carries a [`ServerProfile`]: the timing and quirk
//! parameters that let one client core tolerate a dozen non-conforming
//! servers without per-server branching. All fields are validated once at
//! deserialization — the core never threads untyped dictionaries around.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one language server adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Executable command (e.g. "typescript-language-server").
    pub command: String,
    /// Arguments to pass to the command (e.g. `["--stdio"]`).
    #[serde(default)]
    pub args: Vec<String>,
    /// LSP language identifier (e.g. "rust", "typescript").
    pub language_id: String,
    /// Server-specific `initializationOptions` passed verbatim in the
    /// `initialize` request.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
    /// Timing and quirk parameters.
    #[serde(default)]
    pub profile: ServerProfile,
}

/// Timing and quirk parameters for one server.
///
/// Measured latencies vary by an order of magnitude across real servers —
/// a project-indexing server needs multi-second waits where a single-file
/// server answers in tens of milliseconds — so none of these are hardcoded
/// in the core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerProfile {
    /// Delay after `didOpen` before issuing requests against the document.
    pub document_open_delay_ms: u64,
    /// Upper bound on the post-`initialized` readiness wait for servers
    /// that index a project before they can serve requests.
    pub readiness_check_timeout_ms: u64,
    /// Default deadline for the first diagnostics of a freshly opened
    /// document.
    pub initial_diagnostics_timeout_ms: u64,
    /// Whether the server runs a project-wide indexing step after
    /// `initialized` and is not immediately ready.
    pub requires_project_init: bool,
    /// Whether the server reliably pushes a `publishDiagnostics`
    /// notification for every opened document, including clean ones.
    /// When false, silence cannot be read as "no errors".
    pub sends_initial_diagnostics: bool,
    /// Default per-request deadline for facade operations.
    pub operation_timeout_ms: u64,
    /// Whether diagnostics from this server need the deduplication pass
    /// (duplicate emissions, stale line numbers).
    pub needs_diagnostic_deduplication: bool,
    /// Operations the adapter declares broken regardless of what the
    /// server's capabilities claim.
    pub unsupported: Vec<OperationKind>,
    /// Delay between polls when diagnostics fall back to polling.
    pub diagnostics_poll_interval_ms: u64,
    /// Maximum number of polls before giving up.
    pub diagnostics_max_polls: u32,
    /// Minimum polls before a non-empty result is trusted. Some servers
    /// emit a spurious empty diagnostics notification before the real one.
    pub diagnostics_min_polls: u32,
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self {
            document_open_delay_ms: 0,
            readiness_check_timeout_ms: 1_000,
            initial_diagnostics_timeout_ms: 3_000,
            requires_project_init: false,
            sends_initial_diagnostics: true,
            operation_timeout_ms: 10_000,
            needs_diagnostic_deduplication: false,
            unsupported: Vec::new(),
            diagnostics_poll_interval_ms: 150,
            diagnostics_max_polls: 10,
            diagnostics_min_polls: 2,
        }
    }
}

impl ServerProfile {
    #[must_use]
    pub fn document_open_delay(&self) -> Duration {
        Duration::from_millis(self.document_open_delay_ms)
    }

    #[must_use]
    pub fn readiness_check_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_check_timeout_ms)
    }

    #[must_use]
    pub fn initial_diagnostics_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_diagnostics_timeout_ms)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    #[must_use]
    pub fn diagnostics_poll_interval(&self) -> Duration {
        Duration::from_millis(self.diagnostics_poll_interval_ms)
    }

    #[must_use]
    pub fn declares_unsupported(&self, op: OperationKind) -> bool {
        self.unsupported.contains(&op)
    }
}

/// The operations the facade exposes, used for capability gating and for
/// adapter-declared unsupported lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Hover,
    Definition,
    References,
    Rename,
    PrepareRename,
    Completion,
    SignatureHelp,
    DocumentSymbols,
    WorkspaceSymbols,
    CodeActions,
    Formatting,
    RangeFormatting,
    PullDiagnostics,
}

impl OperationKind {
    /// The LSP method name this operation issues.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Hover => "textDocument/hover",
            Self::Definition => "textDocument/definition",
            Self::References => "textDocument/references",
            Self::Rename => "textDocument/rename",
            Self::PrepareRename => "textDocument/prepareRename",
            Self::Completion => "textDocument/completion",
            Self::SignatureHelp => "textDocument/signatureHelp",
            Self::DocumentSymbols => "textDocument/documentSymbol",
            Self::WorkspaceSymbols => "workspace/symbol",
            Self::CodeActions => "textDocument/codeAction",
            Self::Formatting => "textDocument/formatting",
            Self::RangeFormatting => "textDocument/rangeFormatting",
            Self::PullDiagnostics => "textDocument/diagnostic",
        }
    }
}
