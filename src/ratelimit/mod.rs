//! Rate limiting algorithms and bucket state.

mod bucket;
mod clock;
mod strategy;
mod token_bucket;
mod window;

use std::sync::Arc;

use tracing::info;

pub use bucket::{BucketKey, BucketState, LAST_REFILL_FIELD, TOKENS_FIELD};
pub use clock::{Clock, ManualClock, SystemClock};
pub use strategy::{Decision, RateLimitStrategy};
pub use token_bucket::{TokenBucketLimiter, DEFAULT_KEY_PREFIX};
pub use window::{FixedWindowLimiter, TimeWindow, COUNT_FIELD};

use crate::config::{RateLimitingConfig, StrategyKind};
use crate::error::Result;
use crate::store::BucketStore;

/// Build the configured strategy over `store`.
pub fn build_strategy(
    config: &RateLimitingConfig,
    store: Arc<dyn BucketStore>,
) -> Result<Arc<dyn RateLimitStrategy>> {
    let strategy: Arc<dyn RateLimitStrategy> = match config.strategy {
        StrategyKind::TokenBucket => {
            info!(
                capacity = config.capacity,
                refill_rate = config.refill_rate,
                key_prefix = %config.key_prefix,
                "Using token bucket strategy"
            );
            Arc::new(
                TokenBucketLimiter::new(store, config.capacity, config.refill_rate)?
                    .with_key_prefix(config.key_prefix.as_str())?,
            )
        }
        StrategyKind::FixedWindow => {
            info!(
                limit = config.capacity,
                window = ?config.window,
                key_prefix = %config.key_prefix,
                "Using fixed window strategy"
            );
            Arc::new(
                FixedWindowLimiter::new(store, config.capacity, config.window)?
                    .with_key_prefix(config.key_prefix.as_str())?,
            )
        }
    };
    Ok(strategy)
}
