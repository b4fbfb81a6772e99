//! Core domain types for tether.
//!
//! This crate contains pure domain types with no IO and no async: the
//! normalized shapes that language-server results are converted into at the
//! protocol boundary, plus a few small pure helpers. Everything here can be
//! used from any layer of the application.

mod diagnostics;
mod env;
mod location;
mod results;
mod symbols;
mod text;

pub use diagnostics::{Diagnostic, Severity};
pub use env::{is_denied_env_key, ENV_SECRET_DENYLIST};
pub use location::{Location, Position, Range, TextEdit};
pub use results::{CodeActionInfo, CompletionEntry, HoverInfo, SignatureHelpInfo, SignatureInfo};
pub use symbols::{SymbolInfo, SymbolKind, WorkspaceSymbolInfo};
pub use text::truncate_with_ellipsis;
