//! Idempotency guard: suppressing duplicate work for identical requests.
//!
//! The key binds owner, step, and a digest of the request body, so the
//! same owner re-submitting the same payload within the TTL replays
//! instead of paying for another model call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use prism_core::defaults::IDEMPOTENCY_TTL_MS;
use prism_core::{IdempotencyRecord, IdempotencyStore, Result, TaskStep};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Derive the idempotency key for a request: the body is digested first
/// so the outer hash never sees unbounded input, then owner and step are
/// bound in.
pub fn derive_key(owner_id: &str, step: TaskStep, body: &JsonValue) -> Result<String> {
    let body_digest = hex::encode(Sha256::digest(serde_json::to_string(body)?.as_bytes()));
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(step.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(body_digest.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of an idempotency check.
#[derive(Debug, Clone)]
pub struct IdempotencyCheck {
    pub key: String,
    /// An unexpired record already existed (or we lost a create race).
    pub is_replay: bool,
    /// The caller should run the underlying work.
    pub should_process: bool,
}

/// Guard front-end over an [`IdempotencyStore`].
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    ttl_ms: i64,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            store,
            ttl_ms: IDEMPOTENCY_TTL_MS,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Check whether work for `(owner_id, step, body)` should run.
    ///
    /// Losing a concurrent create race is reported as a replay, never an
    /// error, so two racing callers cannot both process.
    #[instrument(skip(self, body))]
    pub async fn check(
        &self,
        owner_id: &str,
        step: TaskStep,
        body: &JsonValue,
    ) -> Result<IdempotencyCheck> {
        let key = derive_key(owner_id, step, body)?;

        if let Some(existing) = self.store.get(&key).await? {
            if !existing.is_expired(Utc::now()) {
                debug!(idempotency_key = %key, "Replay detected");
                return Ok(IdempotencyCheck {
                    key,
                    is_replay: true,
                    should_process: false,
                });
            }
        }

        let record = IdempotencyRecord {
            key: key.clone(),
            owner_id: owner_id.to_string(),
            step,
            created_at: Utc::now(),
            ttl_ms: self.ttl_ms,
        };
        let created = self.store.create_if_absent(record).await?;
        if !created {
            debug!(idempotency_key = %key, "Lost create race, treating as replay");
        }

        Ok(IdempotencyCheck {
            key,
            is_replay: !created,
            should_process: created,
        })
    }
}

/// Run `handler` only when the guard allows it. Returns the check verdict
/// plus the handler's output (`None` on replay).
pub async fn with_idempotency<F, Fut, T>(
    guard: &IdempotencyGuard,
    owner_id: &str,
    step: TaskStep,
    body: &JsonValue,
    handler: F,
) -> Result<(IdempotencyCheck, Option<T>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let check = guard.check(owner_id, step, body).await?;
    if !check.should_process {
        return Ok((check, None));
    }
    let value = handler().await?;
    Ok((check, Some(value)))
}

/// In-memory `IdempotencyStore`. A single mutex over the map makes
/// `create_if_absent` atomic; expired records are garbage-collected
/// opportunistically on each create.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn create_if_absent(&self, record: IdempotencyRecord) -> Result<bool> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        records.retain(|_, r| !r.is_expired(now));

        if records.contains_key(&record.key) {
            return Ok(false);
        }
        records.insert(record.key.clone(), record);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.records.lock().await.get(key).cloned())
    }
}
