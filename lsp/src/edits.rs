//! Applying server-provided text edits to files.
//!
//! `WorkspaceEdit` ranges address positions in the negotiated encoding
//! (UTF-16 unless the server chose UTF-8), so characters must be converted
//! to byte offsets before splicing. Edits within one file are applied in
//! descending start order so earlier replacements never invalidate the
//! offsets of later ones.

use std::path::PathBuf;

use serde::Serialize;

use crate::capabilities::PositionEncoding;
use crate::error::Result;
use crate::protocol::FileEdits;
use tether_types::{Position, TextEdit};

/// Summary of a workspace edit committed to disk.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedEdit {
    pub files: Vec<PathBuf>,
    pub edit_count: usize,
}

/// Convert an LSP position to a byte offset into `content`.
///
/// Characters past the end of a line clamp to the line end, and lines past
/// the end of the file clamp to the end of the content, per the protocol's
/// leniency rules.
pub(crate) fn position_to_offset(
    content: &str,
    position: Position,
    encoding: PositionEncoding,
) -> usize {
    let mut remaining = position.line;
    let mut line_offset = 0;
    let mut current: Option<&str> = None;
    for line in content.split_inclusive('\n') {
        if remaining == 0 {
            current = Some(line);
            break;
        }
        line_offset += line.len();
        remaining -= 1;
    }
    let Some(line) = current else {
        return content.len();
    };

    let body = line
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(line);

    let mut units: u32 = 0;
    for (byte_idx, ch) in body.char_indices() {
        if units >= position.character {
            return line_offset + byte_idx;
        }
        units += match encoding {
            PositionEncoding::Utf8 => u32::try_from(ch.len_utf8()).unwrap_or(u32::MAX),
            PositionEncoding::Utf16 => u32::try_from(ch.len_utf16()).unwrap_or(u32::MAX),
        };
    }
    line_offset + body.len()
}

/// Apply a set of non-overlapping edits to `content`.
pub(crate) fn apply_text_edits(
    content: &str,
    edits: &[TextEdit],
    encoding: PositionEncoding,
) -> String {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    let mut result = content.to_string();
    for edit in ordered {
        let start = position_to_offset(&result, edit.range.start, encoding);
        let end = position_to_offset(&result, edit.range.end, encoding).max(start);
        result.replace_range(start..end, &edit.new_text);
    }
    result
}

/// Apply per-file edit groups to the files on disk.
pub(crate) async fn apply_workspace_edit(
    groups: &[FileEdits],
    encoding: PositionEncoding,
) -> Result<AppliedEdit> {
    let mut files = Vec::with_capacity(groups.len());
    let mut edit_count = 0;
    for group in groups {
        let content = tokio::fs::read_to_string(&group.path).await?;
        let updated = apply_text_edits(&content, &group.edits, encoding);
        tokio::fs::write(&group.path, updated).await?;
        edit_count += group.edits.len();
        files.push(group.path.clone());
    }
    Ok(AppliedEdit { files, edit_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::Range;

    fn edit(range: Range, new_text: &str) -> TextEdit {
        TextEdit {
            range,
            new_text: new_text.to_string(),
        }
    }

    fn span(line: u32, start: u32, end: u32) -> Range {
        Range::new(Position::new(line, start), Position::new(line, end))
    }

    #[test]
    fn rename_replaces_exactly_the_target_range() {
        let content = "const foo = 1;";
        let result = apply_text_edits(content, &[edit(span(0, 6, 9), "bar")], PositionEncoding::Utf16);
        assert_eq!(result, "const bar = 1;");
    }

    #[test]
    fn multiple_edits_on_one_line_apply_descending() {
        let content = "let a = b + c;";
        let edits = [edit(span(0, 8, 9), "bbb"), edit(span(0, 12, 13), "ccc")];
        let result = apply_text_edits(content, &edits, PositionEncoding::Utf16);
        assert_eq!(result, "let a = bbb + ccc;");
    }

    #[test]
    fn edits_across_lines() {
        let content = "fn foo() {\n    foo();\n}\n";
        let edits = [edit(span(0, 3, 6), "bar"), edit(span(1, 4, 7), "bar")];
        let result = apply_text_edits(content, &edits, PositionEncoding::Utf16);
        assert_eq!(result, "fn bar() {\n    bar();\n}\n");
    }

    #[test]
    fn utf16_offsets_skip_surrogate_pairs() {
        // "🦀" is one char, two UTF-16 units, four UTF-8 bytes.
        let content = "let 🦀x = 1;";
        // x sits at UTF-16 offset 6: l,e,t,space (4) + crab (2).
        let result =
            apply_text_edits(content, &[edit(span(0, 6, 7), "y")], PositionEncoding::Utf16);
        assert_eq!(result, "let 🦀y = 1;");
    }

    #[test]
    fn utf8_offsets_count_bytes() {
        let content = "let 🦀x = 1;";
        // x sits at byte offset 8 under UTF-8 position encoding.
        let result =
            apply_text_edits(content, &[edit(span(0, 8, 9), "y")], PositionEncoding::Utf8);
        assert_eq!(result, "let 🦀y = 1;");
    }

    #[test]
    fn multiline_replacement() {
        let content = "a\nb\nc\n";
        let range = Range::new(Position::new(0, 1), Position::new(2, 0));
        let result = apply_text_edits(content, &[edit(range, "-")], PositionEncoding::Utf16);
        assert_eq!(result, "a-c\n");
    }

    #[test]
    fn character_past_line_end_clamps() {
        let content = "ab\ncd";
        assert_eq!(
            position_to_offset(content, Position::new(0, 99), PositionEncoding::Utf16),
            2
        );
    }

    #[test]
    fn line_past_eof_clamps_to_content_end() {
        let content = "ab\ncd";
        assert_eq!(
            position_to_offset(content, Position::new(9, 0), PositionEncoding::Utf16),
            content.len()
        );
    }

    #[test]
    fn crlf_line_endings_are_not_part_of_the_line() {
        let content = "ab\r\ncd\r\n";
        assert_eq!(
            position_to_offset(content, Position::new(0, 99), PositionEncoding::Utf16),
            2
        );
        assert_eq!(
            position_to_offset(content, Position::new(1, 1), PositionEncoding::Utf16),
            5
        );
    }

    #[test]
    fn empty_content() {
        assert_eq!(
            position_to_offset("", Position::new(0, 0), PositionEncoding::Utf16),
            0
        );
    }

    #[tokio::test]
    async fn workspace_edit_rewrites_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.ts");
        let path_b = dir.path().join("b.ts");
        tokio::fs::write(&path_a, "const foo = 1;\nexport { foo };\n")
            .await
            .unwrap();
        tokio::fs::write(&path_b, "import { foo } from './a';\n")
            .await
            .unwrap();

        let groups = vec![
            FileEdits {
                path: path_a.clone(),
                edits: vec![edit(span(0, 6, 9), "bar"), edit(span(1, 9, 12), "bar")],
            },
            FileEdits {
                path: path_b.clone(),
                edits: vec![edit(span(0, 9, 12), "bar")],
            },
        ];
        let applied = apply_workspace_edit(&groups, PositionEncoding::Utf16)
            .await
            .unwrap();
        assert_eq!(applied.edit_count, 3);
        assert_eq!(applied.files, vec![path_a.clone(), path_b.clone()]);

        let a = tokio::fs::read_to_string(&path_a).await.unwrap();
        assert_eq!(a, "const bar = 1;\nexport { bar };\n");
        let b = tokio::fs::read_to_string(&path_b).await.unwrap();
        assert_eq!(b, "import { bar } from './a';\n");
    }

    #[tokio::test]
    async fn workspace_edit_missing_file_errors() {
        let groups = vec![FileEdits {
            path: PathBuf::from("/definitely/not/here.rs"),
            edits: vec![edit(span(0, 0, 1), "x")],
        }];
        assert!(
            apply_workspace_edit(&groups, PositionEncoding::Utf16)
                .await
                .is_err()
        );
    }
}
