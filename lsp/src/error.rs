//! Typed failures surfaced by the LSP client core.
//!
//! Callers are expected to branch on these: `Unsupported` means skip or
//! degrade, `Timeout` means a retry with a larger budget may help, and an
//! empty-but-successful response is not an error at all (operations return
//! `Option`/empty collections for that case).

use thiserror::Error;

/// Result type for LSP client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the LSP client core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed wire framing (bad or missing `Content-Length` header,
    /// oversized frame). The read loop cannot recover from these.
    #[error("malformed frame: {0}")]
    Framing(String),

    /// A frame body that was fully consumed but failed to parse as JSON.
    /// Recoverable: framing is self-delimiting, the next frame is intact.
    #[error("unparseable frame body: {0}")]
    FrameParse(String),

    /// The server process exited or the pipe closed while work was pending.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection is in its terminal closed state; no request was sent.
    #[error("not connected")]
    NotConnected,

    /// The initialize handshake failed. Fatal to session startup.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// An operation was attempted outside the `Ready` state.
    #[error("client not ready (state: {state})")]
    NotReady { state: &'static str },

    /// A request exceeded its deadline. The server may still be working;
    /// a `$/cancelRequest` is sent best-effort.
    #[error("{method} timed out after {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    /// The adapter or the negotiated capabilities declare the operation
    /// unavailable, or the server answered with method-not-found.
    #[error("{method} not supported by this server")]
    Unsupported { method: String },

    /// The server answered with a JSON-RPC error other than
    /// method-not-found.
    #[error("server returned error {code} for {method}: {message}")]
    Server {
        method: String,
        code: i64,
        message: String,
    },

    /// `didChange`/`didClose` issued for a document that was never opened.
    #[error("document not open: {0}")]
    DocumentNotOpen(String),

    /// A caller-supplied document version that does not strictly increase.
    #[error("stale version {proposed} for {uri} (current version is {current})")]
    StaleVersion {
        uri: String,
        proposed: i32,
        current: i32,
    },

    /// A path that cannot be represented as a `file://` URI, or vice versa.
    #[error("cannot convert between path and file URI: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn framing(message: impl Into<String>) -> Self {
        Self::Framing(message.into())
    }

    pub(crate) fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    pub(crate) fn unsupported(method: impl Into<String>) -> Self {
        Self::Unsupported {
            method: method.into(),
        }
    }

    /// Whether this error means the method is unavailable rather than
    /// transiently failing. Used by the diagnostics reconciler to demote
    /// pull to polling.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
