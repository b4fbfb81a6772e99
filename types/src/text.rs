//! Small pure text helpers.

/// Truncate a string to at most `max` characters, appending `...` if
/// anything was cut.
///
/// - Trims surrounding whitespace first.
/// - Counts `char`s, not bytes, so Unicode scalars are never split.
/// - Enforces a minimum `max` of 3 so the ellipsis always fits.
#[must_use]
pub fn truncate_with_ellipsis(raw: &str, max: usize) -> String {
    let max = max.max(3);
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max - 3).collect();
    format!("{head}...")
}
