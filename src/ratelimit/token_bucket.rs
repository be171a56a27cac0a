//! Token bucket limiter over a shared store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::error::{BucketgateError, LimiterError, Result};
use crate::store::BucketStore;

use super::bucket::{
    expect_fields, validate_prefix, BucketKey, BucketState, LAST_REFILL_FIELD, TOKENS_FIELD,
};
use super::clock::{Clock, SystemClock};
use super::strategy::{Decision, RateLimitStrategy};

/// Default namespace for bucket keys.
pub const DEFAULT_KEY_PREFIX: &str = "bucket";

/// A token bucket rate limiter whose buckets live in a [`BucketStore`].
///
/// Every bucket starts full at `capacity` tokens and regains `refill_rate`
/// tokens per second of wall-clock time, never exceeding `capacity`. Each
/// allowed request spends one token.
///
/// The limiter holds no per-identity state, so one instance can be shared
/// across tasks and any number of processes can point at the same store.
///
/// # Consistency
///
/// Each decision is a plain read followed by a plain write. Concurrent
/// decisions for the same identity can both act on the same read and grant
/// more than the bucket holds. The guarantee is best-effort, not atomic.
pub struct TokenBucketLimiter<S: BucketStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    capacity: u64,
    refill_rate: f64,
    key_prefix: String,
}

impl<S: BucketStore + ?Sized> TokenBucketLimiter<S> {
    /// Create a limiter reading the system clock.
    ///
    /// `capacity` must be at least 1 and `refill_rate` a positive finite
    /// number of tokens per second.
    pub fn new(store: Arc<S>, capacity: u64, refill_rate: f64) -> Result<Self> {
        if capacity == 0 {
            return Err(BucketgateError::Config(
                "token bucket capacity must be at least 1".to_string(),
            ));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(BucketgateError::Config(format!(
                "token bucket refill rate must be positive, got {refill_rate}"
            )));
        }

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            capacity,
            refill_rate,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the key namespace. The prefix must not be empty.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        self.key_prefix = validate_prefix(prefix.into())?;
        Ok(self)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Store key used for `identity`.
    pub fn key_for(&self, identity: &str) -> String {
        BucketKey::new(&self.key_prefix, identity).to_store_key()
    }

    /// Spend one token for `identity` if one is available.
    ///
    /// Performs exactly one store read and, if that succeeds, exactly one
    /// store write. The write happens on denial too, so a denied bucket
    /// resumes refilling from this call's time.
    pub async fn is_allowed(&self, identity: &str) -> std::result::Result<Decision, LimiterError> {
        let now = self.clock.now_secs();
        let key = self.key_for(identity);

        let (state, decision) = match self.read_state(&key).await? {
            None => {
                // First request spends its token straight away.
                let state = BucketState {
                    tokens: (self.capacity - 1) as f64,
                    last_refill: now,
                };
                debug!(
                    key = %key,
                    tokens = state.tokens,
                    "Creating new token bucket"
                );
                (state, Decision::allow(state.whole_tokens()))
            }
            Some(previous) => {
                let mut tokens = self.refill(&key, previous, now);
                let allowed = tokens >= 1.0;
                if allowed {
                    tokens -= 1.0;
                }

                let state = BucketState {
                    tokens,
                    last_refill: now,
                };
                let decision = Decision {
                    allowed,
                    tokens_remaining: state.whole_tokens(),
                };
                (state, decision)
            }
        };

        self.store.set_fields(&key, &state.encode()).await?;

        if decision.allowed {
            trace!(
                key = %key,
                tokens = state.tokens,
                "Token granted"
            );
        } else {
            debug!(
                key = %key,
                tokens = state.tokens,
                "Token bucket exhausted"
            );
        }

        Ok(decision)
    }

    /// Read the stored bucket for `identity` without refilling or writing.
    pub async fn bucket_state(
        &self,
        identity: &str,
    ) -> std::result::Result<Option<BucketState>, LimiterError> {
        self.read_state(&self.key_for(identity)).await
    }

    async fn read_state(&self, key: &str) -> std::result::Result<Option<BucketState>, LimiterError> {
        let values = self
            .store
            .get_fields(key, &[TOKENS_FIELD, LAST_REFILL_FIELD])
            .await?;
        let [tokens, last_refill] = expect_fields(key, values)?;

        BucketState::decode(key, tokens, last_refill).map_err(|e| {
            warn!(key = %key, error = %e, "Refusing to use corrupt bucket state");
            e
        })
    }

    /// Tokens available at `now`, clamped to `[0, capacity]`.
    fn refill(&self, key: &str, previous: BucketState, now: f64) -> f64 {
        let elapsed = now - previous.last_refill;

        // A clock behind the stored refill time adds nothing rather than
        // taking tokens away.
        let added = if elapsed < 0.0 {
            warn!(
                key = %key,
                elapsed_secs = elapsed,
                "Clock is behind stored refill time, skipping refill"
            );
            0.0
        } else {
            elapsed * self.refill_rate
        };

        (previous.tokens + added).clamp(0.0, self.capacity as f64)
    }
}

impl<S: BucketStore + ?Sized> std::fmt::Debug for TokenBucketLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

#[async_trait]
impl<S: BucketStore + ?Sized> RateLimitStrategy for TokenBucketLimiter<S> {
    async fn is_allowed(&self, identity: &str) -> std::result::Result<Decision, LimiterError> {
        self.is_allowed(identity).await
    }
}
