//! Validated caching and idempotency for the request pipeline.
//!
//! Cache entries carry escalating integrity metadata (expiry, checksum,
//! keyed signature) chosen per data sensitivity. The idempotency guard
//! keys units of work by owner, step, and request-body digest so
//! duplicate submissions replay instead of re-running.

pub mod entry;
pub mod idempotency;
pub mod store;
pub mod validate;

pub use entry::{create_entry, CacheEntry, ValidationLevel};
pub use idempotency::{
    derive_key, with_idempotency, IdempotencyCheck, IdempotencyGuard, MemoryIdempotencyStore,
};
pub use store::MemoryCacheStore;
pub use validate::{smart_validate, validate, Validated};
