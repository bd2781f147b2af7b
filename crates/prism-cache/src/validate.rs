//! Entry validation and sensitivity-based level selection.

use chrono::{Duration, Utc};
use prism_core::defaults::CACHE_MAX_AGE_SECS;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::entry::{payload_checksum, sign, CacheEntry, ValidationLevel};

/// Sources whose entries skip validation entirely. These are produced by
/// our own process in the same request cycle.
const TRUSTED_SOURCES: &[&str] = &["internal", "warm_start", "test_fixture"];

/// Validation verdict. Invalid entries never expose their payload; the
/// caller must treat them as a miss and purge.
#[derive(Debug, Clone)]
pub struct Validated {
    pub is_valid: bool,
    pub data: Option<JsonValue>,
    pub reason: Option<String>,
}

impl Validated {
    fn valid(data: JsonValue) -> Self {
        Self {
            is_valid: true,
            data: Some(data),
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            data: None,
            reason: Some(reason.into()),
        }
    }
}

/// Validate `entry` at `level`.
///
/// Levels are cumulative: STRICT runs the STANDARD checks first, STANDARD
/// runs the BASIC checks first. An expired entry fails at BASIC and above
/// no matter how correct its checksum or signature is.
pub fn validate(entry: &CacheEntry, level: ValidationLevel, secret: Option<&str>) -> Validated {
    if level == ValidationLevel::None {
        return Validated::valid(entry.data.clone());
    }

    let now = Utc::now();
    if now >= entry.expires_at {
        return Validated::invalid("entry expired");
    }
    if now - entry.created_at > Duration::seconds(CACHE_MAX_AGE_SECS) {
        return Validated::invalid("entry exceeds maximum age");
    }

    if level >= ValidationLevel::Standard {
        let stored = match entry.checksum.as_deref() {
            Some(c) => c,
            None => return Validated::invalid("checksum required but absent"),
        };
        let computed = match payload_checksum(&entry.data) {
            Ok(c) => c,
            Err(e) => return Validated::invalid(format!("checksum computation failed: {}", e)),
        };
        if stored != computed {
            warn!(cache_level = %level, "Cache entry checksum mismatch");
            return Validated::invalid("checksum mismatch");
        }
    }

    if level >= ValidationLevel::Strict {
        let secret = match secret {
            Some(s) => s,
            None => return Validated::invalid("signature required but no secret configured"),
        };
        let stored = match entry.signature.as_deref() {
            Some(s) => s,
            None => return Validated::invalid("signature required but absent"),
        };
        // Checksum presence was established by the STANDARD stage.
        let checksum = entry.checksum.as_deref().unwrap_or_default();
        let expected = sign(checksum, entry.created_at, secret);
        if stored != expected {
            warn!(cache_level = %level, "Cache entry signature mismatch");
            return Validated::invalid("signature mismatch");
        }
    }

    Validated::valid(entry.data.clone())
}

/// Pick a validation level from the data source's sensitivity, then
/// validate. Trusted sources bypass validation entirely.
pub fn smart_validate(entry: &CacheEntry, source: &str, secret: Option<&str>) -> Validated {
    if TRUSTED_SOURCES.contains(&source) {
        debug!(source, "Trusted source, validation bypassed");
        return Validated::valid(entry.data.clone());
    }

    let level = level_for_source(source);
    debug!(source, cache_level = %level, "Smart validation level selected");
    validate(entry, level, secret)
}

/// Sensitivity classification. Financial and quota data gets the full
/// signature check; user and service data gets checksums; the rest gets
/// freshness checks only.
fn level_for_source(source: &str) -> ValidationLevel {
    let s = source.to_ascii_lowercase();
    if s.contains("financial") || s.contains("quota") || s.contains("billing") {
        ValidationLevel::Strict
    } else if s.contains("user") || s.contains("service") || s.contains("profile") {
        ValidationLevel::Standard
    } else {
        ValidationLevel::Basic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::create_entry;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn entry(level: ValidationLevel) -> CacheEntry {
        create_entry(json!({"score": 85}), level, 300, Some(SECRET)).unwrap()
    }

    #[test]
    fn none_level_always_valid() {
        let mut e = entry(ValidationLevel::None);
        e.expires_at = Utc::now() - Duration::seconds(10);
        let v = validate(&e, ValidationLevel::None, None);
        assert!(v.is_valid);
        assert_eq!(v.data.unwrap()["score"], json!(85));
    }

    #[test]
    fn expired_entry_is_never_valid_despite_correct_integrity() {
        let mut e = entry(ValidationLevel::Strict);
        e.expires_at = Utc::now() - Duration::seconds(1);
        for level in [
            ValidationLevel::Basic,
            ValidationLevel::Standard,
            ValidationLevel::Strict,
        ] {
            let v = validate(&e, level, Some(SECRET));
            assert!(!v.is_valid, "expired entry validated at {level}");
            assert!(v.data.is_none());
            assert_eq!(v.reason.as_deref(), Some("entry expired"));
        }
    }

    #[test]
    fn stale_entry_exceeding_max_age_is_invalid() {
        let mut e = entry(ValidationLevel::Basic);
        e.created_at = Utc::now() - Duration::seconds(CACHE_MAX_AGE_SECS + 60);
        e.expires_at = Utc::now() + Duration::seconds(60);
        let v = validate(&e, ValidationLevel::Basic, None);
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("entry exceeds maximum age"));
    }

    #[test]
    fn fresh_basic_entry_is_valid() {
        let v = validate(&entry(ValidationLevel::Basic), ValidationLevel::Basic, None);
        assert!(v.is_valid);
    }

    #[test]
    fn tampered_payload_fails_standard() {
        let mut e = entry(ValidationLevel::Standard);
        e.data = json!({"score": 9000});
        let v = validate(&e, ValidationLevel::Standard, None);
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("checksum mismatch"));
    }

    #[test]
    fn missing_checksum_fails_standard() {
        let e = entry(ValidationLevel::Basic);
        let v = validate(&e, ValidationLevel::Standard, None);
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("checksum required but absent"));
    }

    #[test]
    fn strict_validates_with_correct_secret() {
        let v = validate(
            &entry(ValidationLevel::Strict),
            ValidationLevel::Strict,
            Some(SECRET),
        );
        assert!(v.is_valid);
    }

    #[test]
    fn strict_fails_with_wrong_secret() {
        let v = validate(
            &entry(ValidationLevel::Strict),
            ValidationLevel::Strict,
            Some("not-the-secret"),
        );
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("signature mismatch"));
    }

    #[test]
    fn strict_fails_without_secret() {
        let v = validate(
            &entry(ValidationLevel::Strict),
            ValidationLevel::Strict,
            None,
        );
        assert!(!v.is_valid);
    }

    #[test]
    fn strict_fails_when_signature_absent() {
        let e = entry(ValidationLevel::Standard);
        let v = validate(&e, ValidationLevel::Strict, Some(SECRET));
        assert!(!v.is_valid);
        assert_eq!(v.reason.as_deref(), Some("signature required but absent"));
    }

    #[test]
    fn smart_validate_picks_strict_for_financial_data() {
        assert_eq!(level_for_source("financial_report"), ValidationLevel::Strict);
        assert_eq!(level_for_source("quota_usage"), ValidationLevel::Strict);
        assert_eq!(level_for_source("billing"), ValidationLevel::Strict);
    }

    #[test]
    fn smart_validate_picks_standard_for_user_data() {
        assert_eq!(level_for_source("user_settings"), ValidationLevel::Standard);
        assert_eq!(level_for_source("service_catalog"), ValidationLevel::Standard);
        assert_eq!(level_for_source("profile"), ValidationLevel::Standard);
    }

    #[test]
    fn smart_validate_defaults_to_basic() {
        assert_eq!(level_for_source("weather"), ValidationLevel::Basic);
    }

    #[test]
    fn trusted_source_bypasses_even_expired_entries() {
        let mut e = entry(ValidationLevel::Basic);
        e.expires_at = Utc::now() - Duration::seconds(1);
        let v = smart_validate(&e, "internal", None);
        assert!(v.is_valid);
    }

    #[test]
    fn untrusted_financial_source_requires_signature() {
        let e = entry(ValidationLevel::Standard);
        let v = smart_validate(&e, "financial_summary", Some(SECRET));
        assert!(!v.is_valid);
    }
}
