//! Environment variable hygiene for spawned server processes.
//!
//! Language servers inherit the parent environment by default; anything
//! matching this denylist is stripped before spawn so credentials never
//! leak into third-party server processes.

/// Glob patterns (uppercase) for environment variables that must not be
/// passed to spawned language servers.
pub const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_KEY",
    "*_TOKEN",
    "*_SECRET*",
    "*_PASSWORD*",
    "*_CREDENTIAL*",
    "*_API_KEY*",
    "AWS_*",
    "AZURE_*",
    "GOOGLE_APPLICATION_*",
    "OPENAI_*",
    "ANTHROPIC_*",
    "GH_TOKEN",
    "GITHUB_TOKEN",
    "NPM_AUTH*",
    "CARGO_REGISTRY_TOKEN",
];

/// Whether `key` matches any denylist pattern. Comparison is
/// case-insensitive; patterns support a leading and/or trailing `*`.
#[must_use]
pub fn is_denied_env_key(key: &str) -> bool {
    let upper = key.to_uppercase();
    ENV_SECRET_DENYLIST
        .iter()
        .any(|pattern| glob_matches(pattern, &upper))
}

fn glob_matches(pattern: &str, key_upper: &str) -> bool {
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(rest), Some(_)) => {
            let inner = rest.strip_suffix('*').unwrap_or(rest);
            key_upper.contains(inner)
        }
        (Some(suffix), None) => key_upper.ends_with(suffix),
        (None, Some(prefix)) => key_upper.starts_with(prefix),
        (None, None) => key_upper == pattern,
    }
}
