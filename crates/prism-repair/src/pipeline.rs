//! Layered parse pipeline over unreliable model output.
//!
//! Strategies run in order of increasing aggressiveness: direct parse,
//! cleaned parse, balanced extraction, heuristic repair. The first
//! strategy that yields valid JSON wins; its name is recorded so callers
//! can monitor how often each layer fires.

use prism_core::defaults::REPAIR_MAX_ATTEMPTS;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::clean::{clean, contains_fence};
use crate::extract::extract_balanced;
use crate::schema::{normalize, ExpectedField};
use crate::syntax::repair;

/// Which layer of the pipeline produced a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Raw content parsed as-is.
    Direct,
    /// Parsed after fence/quote/comma cleaning.
    Cleaned,
    /// Parsed after balanced-bracket extraction from cleaned text.
    Extracted,
    /// Parsed after heuristic syntax repair. Lower confidence.
    Repaired,
}

impl ParseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Cleaned => "cleaned",
            Self::Extracted => "extracted",
            Self::Repaired => "repaired",
        }
    }
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Upper bound on strategies attempted.
    pub max_attempts: usize,
    /// When set, only the direct parse is attempted. Used where a
    /// repaired result would be worse than no result.
    pub strict_mode: bool,
    /// Expected top-level fields; non-empty enables schema normalization
    /// of the parsed value.
    pub expected: Vec<ExpectedField>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            max_attempts: REPAIR_MAX_ATTEMPTS,
            strict_mode: false,
            expected: Vec::new(),
        }
    }
}

impl ValidateOptions {
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Self::default()
        }
    }

    pub fn with_expected(mut self, expected: Vec<ExpectedField>) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Outcome of running the pipeline.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    Success {
        data: JsonValue,
        strategy: ParseStrategy,
        /// Per-strategy failures plus schema coercions, in order.
        warnings: Vec<String>,
        attempts_used: usize,
        /// True only when the repaired (lowest-confidence) layer won.
        fallback_used: bool,
    },
    Failure {
        error: String,
        warnings: Vec<String>,
        attempts_used: usize,
    },
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&JsonValue> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Success { warnings, .. } => warnings,
            Self::Failure { warnings, .. } => warnings,
        }
    }
}

/// Run the layered pipeline over `content`.
pub fn validate(content: &str, options: &ValidateOptions) -> ValidationResult {
    let mut warnings = Vec::new();
    let mut attempts: usize = 0;
    let fenced = contains_fence(content);

    // Direct parse is futile when a markdown fence is present.
    if fenced {
        warnings.push("fence marker present; direct parse skipped".to_string());
    } else if attempts < options.max_attempts {
        attempts += 1;
        match serde_json::from_str::<JsonValue>(content) {
            Ok(data) => return success(data, ParseStrategy::Direct, warnings, attempts, options),
            Err(e) => warnings.push(format!("direct parse failed: {}", e)),
        }
    }

    if options.strict_mode {
        debug!(parse_attempts = attempts, "Strict mode; stopping after direct parse");
        return ValidationResult::Failure {
            error: "content is not valid JSON and strict mode forbids repair".to_string(),
            warnings,
            attempts_used: attempts,
        };
    }

    let cleaned = clean(content);
    if attempts < options.max_attempts {
        attempts += 1;
        match serde_json::from_str::<JsonValue>(&cleaned) {
            Ok(data) => return success(data, ParseStrategy::Cleaned, warnings, attempts, options),
            Err(e) => warnings.push(format!("cleaned parse failed: {}", e)),
        }
    }

    // Extraction operates on the cleaned text so fences and smart quotes
    // no longer confuse the bracket walk.
    let extracted = extract_balanced(&cleaned);
    if attempts < options.max_attempts {
        attempts += 1;
        match extracted {
            Some(candidate) => match serde_json::from_str::<JsonValue>(candidate) {
                Ok(data) => {
                    return success(data, ParseStrategy::Extracted, warnings, attempts, options)
                }
                Err(e) => warnings.push(format!("extracted parse failed: {}", e)),
            },
            None => warnings.push("no balanced JSON structure found".to_string()),
        }
    }

    if attempts < options.max_attempts {
        attempts += 1;
        let candidate = extracted.unwrap_or(&cleaned);
        let repaired = repair(candidate);
        match serde_json::from_str::<JsonValue>(&repaired) {
            Ok(data) => return success(data, ParseStrategy::Repaired, warnings, attempts, options),
            Err(e) => warnings.push(format!("repaired parse failed: {}", e)),
        }
    }

    warn!(parse_attempts = attempts, "All parse strategies exhausted");
    ValidationResult::Failure {
        error: format!("unable to parse content after {} attempts", attempts),
        warnings,
        attempts_used: attempts,
    }
}

fn success(
    data: JsonValue,
    strategy: ParseStrategy,
    mut warnings: Vec<String>,
    attempts: usize,
    options: &ValidateOptions,
) -> ValidationResult {
    let data = if options.expected.is_empty() {
        data
    } else {
        let (normalized, coercions) = normalize(data, &options.expected);
        warnings.extend(coercions);
        normalized
    };

    debug!(
        parse_strategy = strategy.as_str(),
        parse_attempts = attempts,
        "Content parsed"
    );

    ValidationResult::Success {
        data,
        strategy,
        warnings,
        attempts_used: attempts,
        fallback_used: strategy == ParseStrategy::Repaired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use serde_json::json;

    fn run(content: &str) -> ValidationResult {
        validate(content, &ValidateOptions::default())
    }

    fn expect_success(result: &ValidationResult) -> (&JsonValue, ParseStrategy, bool) {
        match result {
            ValidationResult::Success {
                data,
                strategy,
                fallback_used,
                ..
            } => (data, *strategy, *fallback_used),
            ValidationResult::Failure { error, .. } => {
                panic!("expected success, got failure: {error}")
            }
        }
    }

    #[test]
    fn clean_json_parses_directly() {
        let result = run(r#"{"score": 85}"#);
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["score"], json!(85));
        assert_eq!(strategy, ParseStrategy::Direct);
        assert!(!fallback);
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn fenced_json_skips_direct_and_uses_cleaned() {
        let result = run("```json\n{\"score\": 85}\n```");
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["score"], json!(85));
        assert_eq!(strategy, ParseStrategy::Cleaned);
        assert!(!fallback);
        // The skip itself is recorded.
        assert!(result.warnings()[0].contains("direct parse skipped"));
    }

    #[test]
    fn trailing_comma_fixed_by_cleaning() {
        let result = run(r#"{"a": 1,}"#);
        let (_, strategy, _) = expect_success(&result);
        assert_eq!(strategy, ParseStrategy::Cleaned);
    }

    #[test]
    fn json_in_prose_uses_extraction() {
        let result = run(r#"Here is your answer: {"score": 72, "ok": true} — enjoy!"#);
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["score"], json!(72));
        assert_eq!(strategy, ParseStrategy::Extracted);
        assert!(!fallback);
    }

    #[test]
    fn fenced_json_in_prose_extracted_without_fallback_flag() {
        // Fence skips direct; prose defeats the cleaned parse; extraction
        // on the cleaned text succeeds. This must not count as fallback.
        let result = run("Sure! ```json\n{\"score\": 9}\n``` hope that helps");
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["score"], json!(9));
        assert_eq!(strategy, ParseStrategy::Extracted);
        assert!(!fallback);
    }

    #[test]
    fn fenced_prose_with_trailing_comma_keeps_full_shape() {
        let result = run("Sure! ```json\n{\"score\": 85, \"highlights\": [\"a\"],}\n```");
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["score"], json!(85));
        assert_eq!(data["highlights"], json!(["a"]));
        assert_eq!(strategy, ParseStrategy::Extracted);
        assert!(!fallback);
    }

    #[test]
    fn bare_newline_in_string_triggers_repair() {
        let result = run("{\"note\": \"line one\nline two\"}");
        let (data, strategy, fallback) = expect_success(&result);
        assert_eq!(data["note"], json!("line one\nline two"));
        assert_eq!(strategy, ParseStrategy::Repaired);
        assert!(fallback);
    }

    #[test]
    fn unescaped_inner_quote_triggers_repair() {
        let result = run(r#"{"quote": "he said "stop" now"}"#);
        let (data, _, fallback) = expect_success(&result);
        assert_eq!(data["quote"], json!(r#"he said "stop" now"#));
        assert!(fallback);
    }

    #[test]
    fn unparseable_prose_fails_with_accumulated_warnings() {
        let result = run("I could not produce any structured output, sorry.");
        match result {
            ValidationResult::Failure {
                warnings,
                attempts_used,
                ..
            } => {
                assert_eq!(attempts_used, REPAIR_MAX_ATTEMPTS);
                assert_eq!(warnings.len(), 4);
            }
            ValidationResult::Success { .. } => panic!("prose should not parse"),
        }
    }

    #[test]
    fn strict_mode_stops_after_direct() {
        let options = ValidateOptions::strict();
        let result = validate("```json\n{\"a\": 1}\n```", &options);
        match result {
            ValidationResult::Failure { attempts_used, .. } => assert_eq!(attempts_used, 0),
            ValidationResult::Success { .. } => panic!("strict mode must not clean"),
        }

        let ok = validate(r#"{"a": 1}"#, &options);
        assert!(ok.is_success());
    }

    #[test]
    fn max_attempts_caps_strategies() {
        let options = ValidateOptions::default().with_max_attempts(2);
        // Would need extraction (attempt 3) to succeed.
        let result = validate(r#"prose {"a": 1} prose"#, &options);
        match result {
            ValidationResult::Failure { attempts_used, .. } => assert_eq!(attempts_used, 2),
            ValidationResult::Success { .. } => panic!("attempt cap ignored"),
        }
    }

    #[test]
    fn schema_normalization_applies_on_success() {
        let options = ValidateOptions::default().with_expected(vec![
            ExpectedField::new("score", FieldKind::Number),
            ExpectedField::new("highlights", FieldKind::Array),
        ]);
        let result = validate(r#"{"score": "85"}"#, &options);
        let (data, _, _) = expect_success(&result);
        assert_eq!(data["score"], json!(85.0));
        assert_eq!(data["highlights"], json!([]));
        assert_eq!(result.warnings().len(), 2);
    }

    #[test]
    fn repair_runs_on_extracted_slice_when_available() {
        let text = "answer: {\"note\": \"a\nb\"} thanks";
        let result = run(text);
        let (data, strategy, _) = expect_success(&result);
        assert_eq!(strategy, ParseStrategy::Repaired);
        assert_eq!(data["note"], json!("a\nb"));
    }
}
