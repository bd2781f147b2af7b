//! Balanced-bracket extraction: isolating JSON embedded in prose.

/// Extract the first balanced JSON object or array from `content`.
///
/// Scans for the first `{` or `[`, then walks forward tracking bracket
/// depth. String-literal state and escape sequences are tracked so
/// brackets inside string values are ignored. Returns `None` when no
/// opener exists or the brackets never balance.
pub fn extract_balanced(content: &str) -> Option<&str> {
    let start = content.find(['{', '['])?;
    let bytes = content.as_bytes();

    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                // A mismatched closer means the text is not extractable
                // by bracket matching; let the repair strategy try.
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_object() {
        assert_eq!(extract_balanced(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let text = r#"Here is the result: {"a": 1, "b": [2, 3]} Hope that helps!"#;
        assert_eq!(extract_balanced(text), Some(r#"{"a": 1, "b": [2, 3]}"#));
    }

    #[test]
    fn extracts_array() {
        let text = "the list is [1, 2, 3] ok";
        assert_eq!(extract_balanced(text), Some("[1, 2, 3]"));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let text = r#"note {"msg": "set {x} to }y{", "n": 1} end"#;
        assert_eq!(
            extract_balanced(text),
            Some(r#"{"msg": "set {x} to }y{", "n": 1}"#)
        );
    }

    #[test]
    fn ignores_escaped_quotes_inside_strings() {
        let text = r#"{"msg": "quote \" and brace }", "n": 1}"#;
        assert_eq!(extract_balanced(text), Some(text));
    }

    #[test]
    fn handles_nested_structures() {
        let text = r#"x {"a": {"b": [{"c": 1}]}} y"#;
        assert_eq!(extract_balanced(text), Some(r#"{"a": {"b": [{"c": 1}]}}"#));
    }

    #[test]
    fn none_when_no_opener() {
        assert_eq!(extract_balanced("just prose"), None);
    }

    #[test]
    fn none_when_never_balanced() {
        assert_eq!(extract_balanced(r#"{"a": 1"#), None);
    }

    #[test]
    fn none_on_mismatched_closer() {
        assert_eq!(extract_balanced(r#"{"a": [1}]"#), None);
    }

    #[test]
    fn picks_first_structure() {
        let text = r#"{"first": 1} {"second": 2}"#;
        assert_eq!(extract_balanced(text), Some(r#"{"first": 1}"#));
    }
}
