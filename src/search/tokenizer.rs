use std::sync::LazyLock;

use regex::Regex;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("camel-case pattern is valid"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("non-word pattern is valid"));

/// Shared by indexing and querying: splits camelCase, turns every
/// non `[A-Za-z0-9_]` character into a separator, lowercases, and drops
/// single-character tokens. snake_case stays whole.
pub fn tokenize(text: &str) -> Vec<String> {
    let split = CAMEL_BOUNDARY.replace_all(text, "${1} ${2}");
    let cleaned = NON_WORD.replace_all(&split, " ");
    cleaned
        .to_ascii_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}
