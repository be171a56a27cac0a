//! Fixed window counter limiter over a shared store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{BucketgateError, LimiterError, Result};
use crate::store::BucketStore;

use super::bucket::{expect_fields, parse_number, validate_prefix};
use super::clock::{Clock, SystemClock};
use super::strategy::{Decision, RateLimitStrategy};

/// Hash field holding the request count of a window.
pub const COUNT_FIELD: &str = "count";

/// Time window for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }

    /// Start of the window containing `now`, in whole epoch seconds.
    pub fn window_start(&self, now: f64) -> i64 {
        let len = self.duration().as_secs() as i64;
        (now.floor() as i64).div_euclid(len) * len
    }
}

/// Limits each identity to `limit` requests per calendar-aligned window.
///
/// Each window has its own key, `{prefix}:{identity}:{window_start}`, so
/// old windows are simply never read again. Like the token bucket, the
/// read and the write are separate store calls and the guarantee is
/// best-effort.
pub struct FixedWindowLimiter<S: BucketStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    limit: u64,
    window: TimeWindow,
    key_prefix: String,
}

impl<S: BucketStore + ?Sized> FixedWindowLimiter<S> {
    pub fn new(store: Arc<S>, limit: u64, window: TimeWindow) -> Result<Self> {
        if limit == 0 {
            return Err(BucketgateError::Config(
                "fixed window limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            limit,
            window,
            key_prefix: "window".to_string(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        self.key_prefix = validate_prefix(prefix.into())?;
        Ok(self)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    fn key_for(&self, identity: &str, window_start: i64) -> String {
        format!("{}:{}:{}", self.key_prefix, identity, window_start)
    }

    /// Count one request for `identity` in the current window.
    ///
    /// Denied requests are not counted and cause no write.
    pub async fn is_allowed(&self, identity: &str) -> std::result::Result<Decision, LimiterError> {
        let now = self.clock.now_secs();
        let key = self.key_for(identity, self.window.window_start(now));

        let values = self.store.get_fields(&key, &[COUNT_FIELD]).await?;
        let [stored] = expect_fields(&key, values)?;

        let count = match stored {
            Some(raw) => {
                let value = parse_number(&key, COUNT_FIELD, raw.clone())?;
                if value < 0.0 || value.fract() != 0.0 {
                    return Err(LimiterError::CorruptState {
                        key,
                        field: COUNT_FIELD,
                        value: Some(String::from_utf8_lossy(&raw).into_owned()),
                    });
                }
                value as u64
            }
            None => 0,
        };

        if count >= self.limit {
            debug!(
                key = %key,
                count = count,
                limit = self.limit,
                "Fixed window limit exceeded"
            );
            return Ok(Decision::deny(0));
        }

        let count = count + 1;
        self.store
            .set_fields(&key, &[(COUNT_FIELD, count.to_string())])
            .await?;

        trace!(key = %key, count = count, "Request counted");
        Ok(Decision::allow(self.limit - count))
    }
}

#[async_trait]
impl<S: BucketStore + ?Sized> RateLimitStrategy for FixedWindowLimiter<S> {
    async fn is_allowed(&self, identity: &str) -> std::result::Result<Decision, LimiterError> {
        self.is_allowed(identity).await
    }
}
