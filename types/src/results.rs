//! Normalized results for the request surface.
//!
//! Language servers return several wire shapes for the same logical answer
//! (markup unions, `CompletionList` vs bare arrays, …). The protocol layer
//! flattens them into these plain structs.

use crate::location::Range;
use serde::Serialize;

/// Hover content flattened to plain text, plus the range it applies to
/// when the server reported one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoverInfo {
    pub value: String,
    pub range: Option<Range>,
}

/// A single completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionEntry {
    pub label: String,
    pub detail: Option<String>,
    /// Text to insert; falls back to `label` when the server omits it.
    pub insert_text: Option<String>,
    pub documentation: Option<String>,
}

/// One signature in a signature-help response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    pub label: String,
    pub documentation: Option<String>,
    pub parameters: Vec<String>,
}

/// Signature help for a call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureHelpInfo {
    pub signatures: Vec<SignatureInfo>,
    pub active_signature: Option<u32>,
    pub active_parameter: Option<u32>,
}

/// A code action or command offered for a range, title-level only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeActionInfo {
    pub title: String,
    pub kind: Option<String>,
    pub is_preferred: bool,
}
