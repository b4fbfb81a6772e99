//! Positions, ranges and locations in the coordinate space language servers
//! use: zero-indexed lines, zero-indexed characters in the negotiated
//! position encoding.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A zero-indexed position inside a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range between two positions (`end` is exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A resolved location: a filesystem path plus a range.
///
/// Servers speak in `file://` URIs; those are converted to paths at the
/// protocol boundary so consumers never handle URI strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: PathBuf,
    pub range: Range,
}

/// A single text replacement as returned inside a `WorkspaceEdit` or a
/// formatting response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range,
    #[serde(rename = "newText")]
    pub new_text: String,
}
