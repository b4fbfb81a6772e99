//! Internal LSP message serde types and result normalization.
//!
//! Requests and params are built as plain `serde_json` values; raw results
//! are flattened into the normalized shapes from `tether-types`. Servers
//! disagree on result shapes (`Location` vs `LocationLink`, hierarchical vs
//! flat symbols, markup unions), so every parser here accepts all the wire
//! forms the protocol allows.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use tether_types::{
    CodeActionInfo, CompletionEntry, Diagnostic, HoverInfo, Location, Position, Range, Severity,
    SignatureHelpInfo, SignatureInfo, SymbolInfo, SymbolKind, TextEdit, WorkspaceSymbolInfo,
};

/// Display budget for diagnostic messages.
const MAX_DIAGNOSTIC_MESSAGE_CHARS: usize = 400;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

// ── Param builders ─────────────────────────────────────────────────────

pub(crate) fn initialize_params(root_uri: &str, init_options: Option<&Value>) -> Value {
    let mut params = serde_json::json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "general": {
                "positionEncodings": ["utf-8", "utf-16"]
            },
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "publishDiagnostics": {
                    "relatedInformation": false
                },
                "diagnostic": {
                    "dynamicRegistration": false
                }
            }
        },
        "workspaceFolders": [{
            "uri": root_uri,
            "name": "workspace"
        }]
    });
    if let Some(options) = init_options {
        params["initializationOptions"] = options.clone();
    }
    params
}

pub(crate) fn did_open_params(uri: &str, language_id: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

pub(crate) fn did_close_params(uri: &str) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

pub(crate) fn position_params(uri: &str, position: Position) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "position": { "line": position.line, "character": position.character }
    })
}

pub(crate) fn reference_params(uri: &str, position: Position, include_declaration: bool) -> Value {
    let mut params = position_params(uri, position);
    params["context"] = serde_json::json!({ "includeDeclaration": include_declaration });
    params
}

pub(crate) fn rename_params(uri: &str, position: Position, new_name: &str) -> Value {
    let mut params = position_params(uri, position);
    params["newName"] = Value::String(new_name.to_string());
    params
}

pub(crate) fn document_symbol_params(uri: &str) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

pub(crate) fn workspace_symbol_params(query: &str) -> Value {
    serde_json::json!({ "query": query })
}

pub(crate) fn code_action_params(uri: &str, range: Range) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "range": range,
        "context": { "diagnostics": [] }
    })
}

pub(crate) fn formatting_params(uri: &str, tab_size: u32, insert_spaces: bool) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "options": { "tabSize": tab_size, "insertSpaces": insert_spaces }
    })
}

pub(crate) fn range_formatting_params(
    uri: &str,
    range: Range,
    tab_size: u32,
    insert_spaces: bool,
) -> Value {
    let mut params = formatting_params(uri, tab_size, insert_spaces);
    params["range"] = serde_json::to_value(range).unwrap_or(Value::Null);
    params
}

pub(crate) fn pull_diagnostics_params(uri: &str) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

pub(crate) fn cancel_params(id: u64) -> Value {
    serde_json::json!({ "id": id })
}

// ── Diagnostics ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<WireDiagnostic>,
}

/// A diagnostic as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct WireDiagnostic {
    pub range: Range,
    pub severity: Option<u64>,
    pub source: Option<String>,
    pub message: String,
    pub code: Option<Value>,
}

impl WireDiagnostic {
    /// Normalize: missing severity becomes `Warning`, the source resolves
    /// to a concrete string, and the message is truncated for display.
    pub fn into_diagnostic(self) -> Diagnostic {
        let code = self.code.and_then(|c| match c {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Diagnostic::new(
            self.severity
                .and_then(Severity::from_lsp)
                .unwrap_or(Severity::Warning),
            self.range,
            tether_types::truncate_with_ellipsis(&self.message, MAX_DIAGNOSTIC_MESSAGE_CHARS),
            self.source.unwrap_or_else(|| String::from("unknown")),
            code,
        )
    }
}

pub(crate) fn diagnostics_from_wire(wire: Vec<WireDiagnostic>) -> Vec<Diagnostic> {
    wire.into_iter().map(WireDiagnostic::into_diagnostic).collect()
}

/// Result of a `textDocument/diagnostic` pull.
#[derive(Debug)]
pub(crate) enum PullReport {
    Full(Vec<Diagnostic>),
    /// The server says nothing changed since the last report.
    Unchanged,
}

pub(crate) fn pull_report_from_value(value: Value) -> Result<PullReport> {
    if value.is_null() {
        return Ok(PullReport::Full(Vec::new()));
    }
    match value.get("kind").and_then(Value::as_str) {
        Some("unchanged") => Ok(PullReport::Unchanged),
        // Servers predating the report kinds return a bare item list.
        _ => {
            let items = value
                .get("items")
                .cloned()
                .unwrap_or_else(|| value.clone());
            let wire: Vec<WireDiagnostic> = serde_json::from_value(items)?;
            Ok(PullReport::Full(diagnostics_from_wire(wire)))
        }
    }
}

// ── Locations ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawLocation {
    uri: String,
    range: Range,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocationLink {
    target_uri: String,
    target_selection_range: Range,
}

fn location_from_raw(raw: RawLocation) -> Option<Location> {
    file_uri_to_path(&raw.uri).map(|path| Location {
        path,
        range: raw.range,
    })
}

/// Parse a definition/references style result: `null`, a single `Location`,
/// a `Location[]`, or a `LocationLink[]`.
pub(crate) fn locations_from_value(value: Value) -> Vec<Location> {
    if value.is_null() {
        return Vec::new();
    }

    if let Ok(loc) = serde_json::from_value::<RawLocation>(value.clone()) {
        return location_from_raw(loc).into_iter().collect();
    }

    if let Ok(locs) = serde_json::from_value::<Vec<RawLocation>>(value.clone()) {
        return locs.into_iter().filter_map(location_from_raw).collect();
    }

    if let Ok(links) = serde_json::from_value::<Vec<RawLocationLink>>(value) {
        return links
            .into_iter()
            .filter_map(|link| {
                file_uri_to_path(&link.target_uri).map(|path| Location {
                    path,
                    range: link.target_selection_range,
                })
            })
            .collect();
    }

    Vec::new()
}

// ── Hover ──────────────────────────────────────────────────────────────

fn marked_string_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        // MarkedString { language, value } and MarkupContent { kind, value }
        // both carry the text in "value".
        Value::Object(o) => o.get("value").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// Flatten a hover result into plain text.
pub(crate) fn hover_from_value(value: Value) -> Option<HoverInfo> {
    let contents = value.get("contents")?;
    let text = match contents {
        Value::Array(parts) => {
            let joined: Vec<String> = parts.iter().filter_map(marked_string_text).collect();
            if joined.is_empty() {
                return None;
            }
            joined.join("\n")
        }
        other => marked_string_text(other)?,
    };
    if text.trim().is_empty() {
        return None;
    }
    let range = value
        .get("range")
        .and_then(|r| serde_json::from_value(r.clone()).ok());
    Some(HoverInfo { value: text, range })
}

// ── Symbols ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDocumentSymbol {
    name: String,
    kind: u64,
    range: Range,
    #[serde(default)]
    children: Vec<RawDocumentSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbolInformation {
    name: String,
    kind: u64,
    location: RawLocation,
    #[serde(default)]
    container_name: Option<String>,
}

fn convert_document_symbol(raw: RawDocumentSymbol) -> Option<SymbolInfo> {
    Some(SymbolInfo {
        name: raw.name,
        kind: SymbolKind::from_lsp(raw.kind)?,
        range: raw.range,
        children: raw
            .children
            .into_iter()
            .filter_map(convert_document_symbol)
            .collect(),
    })
}

/// Parse a document-symbol result: hierarchical `DocumentSymbol[]` or flat
/// `SymbolInformation[]`.
pub(crate) fn symbols_from_value(value: Value) -> Vec<SymbolInfo> {
    if value.is_null() {
        return Vec::new();
    }

    // SymbolInformation is distinguished by its "location" field; try it
    // first since DocumentSymbol's deserialization would also accept it.
    if let Ok(symbols) = serde_json::from_value::<Vec<RawSymbolInformation>>(value.clone()) {
        return symbols
            .into_iter()
            .filter_map(|s| {
                Some(SymbolInfo {
                    name: s.name,
                    kind: SymbolKind::from_lsp(s.kind)?,
                    range: s.location.range,
                    children: Vec::new(),
                })
            })
            .collect();
    }

    if let Ok(symbols) = serde_json::from_value::<Vec<RawDocumentSymbol>>(value) {
        return symbols
            .into_iter()
            .filter_map(convert_document_symbol)
            .collect();
    }

    Vec::new()
}

pub(crate) fn workspace_symbols_from_value(value: Value) -> Vec<WorkspaceSymbolInfo> {
    if value.is_null() {
        return Vec::new();
    }
    let Ok(symbols) = serde_json::from_value::<Vec<RawSymbolInformation>>(value) else {
        return Vec::new();
    };
    symbols
        .into_iter()
        .filter_map(|s| {
            Some(WorkspaceSymbolInfo {
                name: s.name,
                kind: SymbolKind::from_lsp(s.kind)?,
                location: location_from_raw(s.location)?,
                container: s.container_name,
            })
        })
        .collect()
}

// ── Completion ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompletionItem {
    label: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    insert_text: Option<String>,
    #[serde(default)]
    documentation: Option<Value>,
}

/// Parse a completion result: `CompletionItem[]` or `CompletionList`.
pub(crate) fn completions_from_value(value: Value) -> Vec<CompletionEntry> {
    if value.is_null() {
        return Vec::new();
    }
    let items = if let Some(list_items) = value.get("items") {
        list_items.clone()
    } else {
        value
    };
    let Ok(raw) = serde_json::from_value::<Vec<RawCompletionItem>>(items) else {
        return Vec::new();
    };
    raw.into_iter()
        .map(|item| CompletionEntry {
            label: item.label,
            detail: item.detail,
            insert_text: item.insert_text,
            documentation: item.documentation.as_ref().and_then(marked_string_text),
        })
        .collect()
}

// ── Signature help ─────────────────────────────────────────────────────

pub(crate) fn signature_help_from_value(value: Value) -> Option<SignatureHelpInfo> {
    let signatures = value.get("signatures")?.as_array()?;
    if signatures.is_empty() {
        return None;
    }

    let parsed: Vec<SignatureInfo> = signatures
        .iter()
        .filter_map(|sig| {
            let label = sig.get("label")?.as_str()?.to_string();
            let parameters = sig
                .get("parameters")
                .and_then(Value::as_array)
                .map(|params| {
                    params
                        .iter()
                        .filter_map(|p| parameter_label(&label, p.get("label")?))
                        .collect()
                })
                .unwrap_or_default();
            Some(SignatureInfo {
                documentation: sig.get("documentation").and_then(marked_string_text),
                label,
                parameters,
            })
        })
        .collect();

    if parsed.is_empty() {
        return None;
    }

    let as_u32 = |v: &Value| u32::try_from(v.as_u64()?).ok();
    Some(SignatureHelpInfo {
        signatures: parsed,
        active_signature: value.get("activeSignature").and_then(as_u32),
        active_parameter: value.get("activeParameter").and_then(as_u32),
    })
}

/// A parameter label is either a plain string or a `[start, end]` offset
/// pair into the signature label.
fn parameter_label(signature_label: &str, label: &Value) -> Option<String> {
    match label {
        Value::String(s) => Some(s.clone()),
        Value::Array(bounds) if bounds.len() == 2 => {
            let start = usize::try_from(bounds[0].as_u64()?).ok()?;
            let end = usize::try_from(bounds[1].as_u64()?).ok()?;
            if start > end {
                return None;
            }
            let slice: String = signature_label
                .chars()
                .skip(start)
                .take(end - start)
                .collect();
            (!slice.is_empty()).then_some(slice)
        }
        _ => None,
    }
}

// ── Code actions ───────────────────────────────────────────────────────

/// Parse a code-action result: a mixed array of `Command` and `CodeAction`.
pub(crate) fn code_actions_from_value(value: Value) -> Vec<CodeActionInfo> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.to_string();
            // Bare commands have a string "command" field and no kind.
            let kind = item
                .get("kind")
                .and_then(Value::as_str)
                .map(String::from);
            Some(CodeActionInfo {
                title,
                kind,
                is_preferred: item
                    .get("isPreferred")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        })
        .collect()
}

// ── Text edits and workspace edits ─────────────────────────────────────

pub(crate) fn text_edits_from_value(value: Value) -> Vec<TextEdit> {
    if value.is_null() {
        return Vec::new();
    }
    serde_json::from_value(value).unwrap_or_default()
}

/// Parse a prepareRename result: `Range`, `{ range, placeholder }`, or
/// `{ defaultBehavior }`.
pub(crate) fn prepare_rename_range(value: Value) -> Option<Range> {
    if value.is_null() {
        return None;
    }
    if let Ok(range) = serde_json::from_value::<Range>(value.clone()) {
        return Some(range);
    }
    value
        .get("range")
        .and_then(|r| serde_json::from_value(r.clone()).ok())
}

/// Edits for one file extracted from a `WorkspaceEdit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdits {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
}

/// Flatten a `WorkspaceEdit` into per-file edit groups.
///
/// `documentChanges` takes precedence over `changes` when both are present
/// (the protocol says a server uses one or the other). Resource operations
/// (create/rename/delete file) are not produced by rename on any supported
/// server and are skipped.
pub(crate) fn workspace_edit_from_value(value: &Value) -> Vec<FileEdits> {
    let mut groups: Vec<FileEdits> = Vec::new();
    let mut push = |path: PathBuf, edits: Vec<TextEdit>| {
        if edits.is_empty() {
            return;
        }
        if let Some(existing) = groups.iter_mut().find(|g| g.path == path) {
            existing.edits.extend(edits);
        } else {
            groups.push(FileEdits { path, edits });
        }
    };

    if let Some(doc_changes) = value.get("documentChanges").and_then(Value::as_array) {
        for change in doc_changes {
            let Some(uri) = change
                .pointer("/textDocument/uri")
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(path) = file_uri_to_path(uri) else {
                continue;
            };
            let edits = change
                .get("edits")
                .map(|e| text_edits_from_value(e.clone()))
                .unwrap_or_default();
            push(path, edits);
        }
        return groups;
    }

    if let Some(changes) = value.get("changes").and_then(Value::as_object) {
        for (uri, edits) in changes {
            let Some(path) = file_uri_to_path(uri) else {
                continue;
            };
            push(path, text_edits_from_value(edits.clone()));
        }
    }

    groups
}

// ── URIs ───────────────────────────────────────────────────────────────

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url> {
    url::Url::from_file_path(path)
        .map_err(|()| Error::InvalidPath(path.display().to_string()))
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}
