//! Rule-based extraction: the degraded path when both the provider result
//! and the repair pipeline fail to yield structured data.
//!
//! Scrapes the raw model text with per-step regex rules and assembles the
//! step's minimal shape from whatever it finds. Output from here is
//! always flagged `fallback_used` by the orchestrator.

use once_cell::sync::Lazy;
use prism_core::TaskStep;
use regex::Regex;
use serde_json::{json, Value as JsonValue};

/// "score: 85", "Score = 85%", "score of 85".
static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)score\D{0,10}(\d{1,3})").expect("score regex is valid"));

/// Bullet lines: "- item", "* item", "• item".
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*•]\s+(.+?)\s*$").expect("bullet regex is valid"));

/// Extract a degraded result for `step` from raw model text.
///
/// Returns `None` when the text contains nothing usable for the step, so
/// the caller can surface a proper failure instead of an empty shell.
pub fn extract(step: TaskStep, raw: &str) -> Option<JsonValue> {
    match step {
        TaskStep::SummarizeResume | TaskStep::SummarizeJob => {
            first_paragraph(raw).map(|p| json!({ "summary": p }))
        }
        TaskStep::Match => {
            let score = scrape_score(raw);
            let highlights = scrape_bullets(raw);
            let summary = first_paragraph(raw);
            if score.is_none() && highlights.is_empty() && summary.is_none() {
                return None;
            }
            Some(json!({
                "score": score.unwrap_or(0),
                "highlights": highlights,
                "summary": summary.unwrap_or_default(),
            }))
        }
        TaskStep::GenerateLetter => {
            let body = raw.trim();
            if body.is_empty() {
                None
            } else {
                Some(json!({ "letter": body }))
            }
        }
    }
}

/// First score-looking integer clamped to 0..=100.
fn scrape_score(raw: &str) -> Option<u32> {
    SCORE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|n| n.min(100))
}

fn scrape_bullets(raw: &str) -> Vec<String> {
    BULLET
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First non-empty paragraph, capped so a rambling transcript does not
/// become the "summary".
fn first_paragraph(raw: &str) -> Option<String> {
    let paragraph = raw
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty())?
        .to_string();
    let capped: String = paragraph.chars().take(600).collect();
    Some(capped)
}
