//! Rate limiting strategy trait.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LimiterError;

/// Outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Whole tokens left after this decision, reported on allow and deny
    pub tokens_remaining: u64,
}

impl Decision {
    pub fn allow(tokens_remaining: u64) -> Self {
        Self {
            allowed: true,
            tokens_remaining,
        }
    }

    pub fn deny(tokens_remaining: u64) -> Self {
        Self {
            allowed: false,
            tokens_remaining,
        }
    }
}

/// Trait for rate limiting algorithms.
///
/// Request handlers hold an `Arc<dyn RateLimitStrategy>` so the algorithm
/// can be chosen at startup without the handler knowing which one runs.
#[async_trait]
pub trait RateLimitStrategy: Send + Sync {
    /// Decide whether `identity` may make one more request.
    ///
    /// An `Err` means no decision could be made; it is not a denial.
    async fn is_allowed(&self, identity: &str) -> Result<Decision, LimiterError>;
}
