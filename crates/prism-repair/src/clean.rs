//! Text cleaning: the pre-parse normalization strategy.
//!
//! Removes the decorations models habitually wrap JSON in: markdown code
//! fences, curly and full-width quotes, non-ASCII spaces, trailing commas,
//! and a leading byte-order mark.

use once_cell::sync::Lazy;
use regex::Regex;

/// Markdown fence token, with optional language tag (```json, ```).
static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[a-zA-Z0-9_-]*").expect("fence regex is valid"));

/// Whether the content contains a markdown fence marker. Direct parsing
/// is pointless in that case.
pub fn contains_fence(content: &str) -> bool {
    content.contains("```")
}

/// Clean `content` for parsing.
///
/// Order matters: fences are removed first so the quote and comma passes
/// see the undecorated text.
pub fn clean(content: &str) -> String {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let without_fences = FENCE.replace_all(content, "");
    let normalized = normalize_quotes(&without_fences);
    strip_trailing_commas(&normalized)
}

/// Replace curly/full-width quotes and exotic spaces with their ASCII
/// equivalents.
fn normalize_quotes(content: &str) -> String {
    content
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{FF07}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{FF02}' => '"',
            '\u{00A0}' | '\u{3000}' => ' ',
            other => other,
        })
        .collect()
}

/// Remove commas that directly precede a closing brace or bracket.
///
/// String-literal state is tracked so commas inside values are untouched.
fn strip_trailing_commas(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Look ahead past whitespace; drop the comma if a closer
                // follows.
                let mut lookahead = chars.clone();
                let next_significant = loop {
                    match lookahead.next() {
                        Some(w) if w.is_whitespace() => continue,
                        other => break other,
                    }
                };
                match next_significant {
                    Some('}') | Some(']') => {} // trailing comma, drop
                    _ => out.push(c),
                }
            }
            _ => out.push(c),
        }
    }

    out
}
