//! Cache entries with escalating integrity levels.

use chrono::{DateTime, Duration, Utc};
use prism_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Context string for deriving the signature key. Changing it invalidates
/// every existing STRICT entry.
const SIGNATURE_CONTEXT: &str = "prism-cache 2025-11-04 entry signature";

/// How much integrity checking an entry carries and requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// No checks. Always valid.
    None,
    /// Expiry and max-age checks only.
    Basic,
    /// Basic plus a sha256 checksum over the payload.
    Standard,
    /// Standard plus a keyed blake3 signature over checksum + timestamp.
    /// Requires a secret.
    Strict,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached payload plus the metadata needed to validate it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Build an entry carrying the integrity fields `level` demands.
///
/// STRICT requires a secret; calling without one is a configuration error,
/// not a silently-downgraded entry.
pub fn create_entry(
    data: JsonValue,
    level: ValidationLevel,
    ttl_secs: u64,
    secret: Option<&str>,
) -> Result<CacheEntry> {
    let created_at = Utc::now();
    let expires_at = created_at + Duration::seconds(ttl_secs as i64);

    let checksum = if level >= ValidationLevel::Standard {
        Some(payload_checksum(&data)?)
    } else {
        None
    };

    let signature = if level >= ValidationLevel::Strict {
        let secret = secret.ok_or_else(|| {
            Error::Config("strict cache entries require a signing secret".to_string())
        })?;
        let checksum = checksum
            .as_deref()
            .ok_or_else(|| Error::Internal("checksum missing for strict entry".to_string()))?;
        Some(sign(checksum, created_at, secret))
    } else {
        None
    };

    Ok(CacheEntry {
        data,
        created_at,
        expires_at,
        checksum,
        signature,
    })
}

/// sha256 hex digest of the serialized payload.
pub(crate) fn payload_checksum(data: &JsonValue) -> Result<String> {
    let serialized = serde_json::to_string(data)?;
    let digest = Sha256::digest(serialized.as_bytes());
    Ok(hex::encode(digest))
}

/// Keyed blake3 signature over `checksum:created_at`.
///
/// The key is derived from the secret so the raw secret never feeds the
/// hash directly and the derivation is domain-separated.
pub(crate) fn sign(checksum: &str, created_at: DateTime<Utc>, secret: &str) -> String {
    let key = blake3::derive_key(SIGNATURE_CONTEXT, secret.as_bytes());
    let message = format!("{}:{}", checksum, created_at.to_rfc3339());
    blake3::keyed_hash(&key, message.as_bytes())
        .to_hex()
        .to_string()
}
