//! Heuristic syntax repair: the last-resort parsing strategy.
//!
//! Fixes the two malformations models most often emit inside string
//! literals: raw control characters (bare newlines) and unescaped inner
//! quotes. Best effort by design; results parsed via this path are
//! flagged `fallback_used` so callers can treat them as lower confidence.

/// Repair common string-literal syntax errors in near-JSON text.
pub fn repair(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 16);
    let chars: Vec<char> = content.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            // Bare control characters are invalid inside JSON strings.
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => {
                if closes_string(&chars, i + 1) {
                    in_string = false;
                    out.push(c);
                } else {
                    // Inner quote the model forgot to escape.
                    out.push_str("\\\"");
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Decide whether the quote at position `i - 1` terminates its string.
///
/// Heuristic: a terminator is followed (after optional whitespace) by a
/// structural character or end of input. Anything else means the quote
/// was content.
fn closes_string(chars: &[char], mut next: usize) -> bool {
    while next < chars.len() && chars[next].is_whitespace() {
        next += 1;
    }
    match chars.get(next) {
        None => true,
        Some(c) => matches!(c, ',' | ':' | '}' | ']'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_bare_newline_in_string() {
        let repaired = repair("{\"a\": \"line one\nline two\"}");
        assert_eq!(repaired, r#"{"a": "line one\nline two"}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[test]
    fn escapes_tab_and_carriage_return() {
        let repaired = repair("{\"a\": \"x\ty\r\"}");
        assert_eq!(repaired, r#"{"a": "x\ty\r"}"#);
    }

    #[test]
    fn leaves_newlines_outside_strings() {
        let input = "{\n  \"a\": 1\n}";
        assert_eq!(repair(input), input);
    }

    #[test]
    fn escapes_unescaped_inner_quote() {
        let repaired = repair(r#"{"quote": "he said "stop" loudly"}"#);
        assert_eq!(repaired, r#"{"quote": "he said \"stop\" loudly"}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[test]
    fn keeps_legitimate_terminators() {
        let input = r#"{"a": "x", "b": "y"}"#;
        assert_eq!(repair(input), input);
    }

    #[test]
    fn keeps_already_escaped_quotes() {
        let input = r#"{"a": "say \"hi\""}"#;
        assert_eq!(repair(input), input);
    }

    #[test]
    fn terminator_before_closing_bracket() {
        let input = r#"["one", "two"]"#;
        assert_eq!(repair(input), input);
    }

    #[test]
    fn terminator_at_end_of_input() {
        let input = r#""tail""#;
        assert_eq!(repair(input), input);
    }
}
