//! LSP client core for tether.
//!
//! Runs one language server process per [`Session`] and multiplexes any
//! number of concurrent requests over its stdio pipe. The session tracks
//! negotiated capabilities, open documents and diagnostics, and exposes the
//! capability-gated operations (hover, definitions, references, rename,
//! completion, symbols, code actions, formatting, diagnostics) that the
//! tool layer builds on.
//!
//! Sessions are explicit handles: create one per adapter and workspace
//! root, pass it to whoever needs it, and `stop()` it when done. A session
//! whose server dies is terminally closed — callers start a new one.

pub mod codec;
pub mod config;
pub mod error;

mod capabilities;
mod connection;
mod diagnostics;
mod documents;
mod edits;
mod ops;
mod protocol;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use capabilities::{PositionEncoding, ServerCapabilities};
pub use config::{AdapterConfig, OperationKind, ServerProfile};
pub use diagnostics::{DeliveryMode, DiagnosticsReport, WaitOptions};
pub use edits::AppliedEdit;
pub use error::{Error, Result};
pub use ops::FormatOptions;
pub use protocol::FileEdits;
pub use session::{Session, SessionState};
