//! Shared key-value store access.
//!
//! Bucket state lives outside the process so that every instance enforces
//! the same quota. This module defines the narrow hash-field interface the
//! limiters need and the adapters that provide it.

mod memory;
mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Errors raised by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("store connection closed")]
    Closed,
    /// The store answered, but the key holds something other than a hash
    /// of the expected shape.
    #[error("unusable value at {key}: {detail}")]
    Malformed { key: String, detail: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Field-level access to hashes stored under string keys.
///
/// Implementations make a single attempt per call and surface failures
/// as [`StoreError`]; retries are the caller's business.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Read `fields` under `key`, returning one slot per requested field
    /// in the same order. Missing keys and missing fields read as `None`.
    ///
    /// Values are returned as raw bytes; interpreting them is up to the
    /// caller.
    async fn get_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    /// Write all `fields` under `key` in one call.
    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;
}
