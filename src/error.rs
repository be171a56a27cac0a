//! Error types for Bucketgate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Bucketgate operations.
#[derive(Error, Debug)]
pub enum BucketgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiting errors
    #[error("Rate limit error: {0}")]
    Limiter(#[from] LimiterError),

    /// Store errors outside of a rate limit decision (connect, close)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a rate limit decision.
///
/// These are never a decision: a caller that receives one must not treat
/// it as either an allow or a deny.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// The quota backend could not be read or written.
    #[error("quota backend unavailable: {0}")]
    BackendUnavailable(StoreError),

    /// A stored field is present but cannot be interpreted.
    #[error("corrupt bucket state at {key}: field {field} has value {value:?}")]
    CorruptState {
        /// Store key holding the bucket
        key: String,
        /// Offending field name, or [`KEY_TYPE_FIELD`] when the key itself
        /// holds the wrong kind of value
        field: &'static str,
        /// Raw stored value, `None` when a required field is missing
        value: Option<String>,
    },
}

/// `CorruptState::field` for a key that is not a usable hash at all.
pub const KEY_TYPE_FIELD: &str = "type";

impl From<StoreError> for LimiterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Malformed { key, detail } => LimiterError::CorruptState {
                key,
                field: KEY_TYPE_FIELD,
                value: Some(detail),
            },
            other => LimiterError::BackendUnavailable(other),
        }
    }
}

impl LimiterError {
    /// Whether this failure came from the store rather than from its data.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, LimiterError::BackendUnavailable(_))
    }
}

/// Result type alias for Bucketgate operations.
pub type Result<T> = std::result::Result<T, BucketgateError>;
