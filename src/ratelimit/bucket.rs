//! Bucket keys and the stored representation of bucket state.

use serde::Serialize;

use crate::error::{BucketgateError, LimiterError};
use crate::store::StoreError;

/// Hash field holding the token count.
pub const TOKENS_FIELD: &str = "tokens";
/// Hash field holding the last refill time in epoch seconds.
pub const LAST_REFILL_FIELD: &str = "lastRefill";

/// The store key for one identity's bucket.
///
/// Formatted as `{prefix}:{identity}`. The identity is used verbatim, so
/// identities containing `:` still map to distinct keys as long as the
/// prefix does not vary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Namespace shared by every bucket of a limiter
    pub prefix: String,
    /// Caller identity
    pub identity: String,
}

impl BucketKey {
    pub fn new(prefix: &str, identity: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            identity: identity.to_string(),
        }
    }

    /// The key as written to the store.
    pub fn to_store_key(&self) -> String {
        format!("{}:{}", self.prefix, self.identity)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.prefix, self.identity)
    }
}

/// Accept a key namespace. An empty prefix would put buckets at `:{identity}`.
pub(crate) fn validate_prefix(prefix: String) -> crate::error::Result<String> {
    if prefix.is_empty() {
        return Err(BucketgateError::Config(
            "key prefix must not be empty".to_string(),
        ));
    }
    Ok(prefix)
}

/// Check that a store read returned exactly one slot per requested field.
pub(crate) fn expect_fields<const N: usize>(
    key: &str,
    values: Vec<Option<Vec<u8>>>,
) -> Result<[Option<Vec<u8>>; N], LimiterError> {
    values.try_into().map_err(|values: Vec<_>| {
        LimiterError::BackendUnavailable(StoreError::Unavailable(format!(
            "read of {key} returned {} fields, expected {N}",
            values.len()
        )))
    })
}

/// Token bucket state as held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketState {
    pub tokens: f64,
    #[serde(rename = "lastRefill")]
    pub last_refill: f64,
}

impl BucketState {
    /// Decode the `[tokens, lastRefill]` pair returned by the store.
    ///
    /// Returns `Ok(None)` for a bucket that has never been written. A
    /// bucket with tokens but no refill time is corrupt, not new.
    pub fn decode(
        key: &str,
        tokens: Option<Vec<u8>>,
        last_refill: Option<Vec<u8>>,
    ) -> Result<Option<Self>, LimiterError> {
        let Some(tokens) = tokens else {
            return Ok(None);
        };
        let tokens = parse_number(key, TOKENS_FIELD, tokens)?;

        let Some(last_refill) = last_refill else {
            return Err(LimiterError::CorruptState {
                key: key.to_string(),
                field: LAST_REFILL_FIELD,
                value: None,
            });
        };
        let last_refill = parse_number(key, LAST_REFILL_FIELD, last_refill)?;

        Ok(Some(Self {
            tokens,
            last_refill,
        }))
    }

    /// Field/value pairs to write back.
    pub fn encode(&self) -> [(&'static str, String); 2] {
        [
            (TOKENS_FIELD, self.tokens.to_string()),
            (LAST_REFILL_FIELD, self.last_refill.to_string()),
        ]
    }

    /// Whole tokens available, truncated toward zero.
    pub fn whole_tokens(&self) -> u64 {
        // `as` saturates: negative and NaN map to 0.
        self.tokens.floor() as u64
    }
}

/// Parse a stored decimal. Non-UTF-8 bytes and non-finite values count
/// as corrupt.
pub(crate) fn parse_number(
    key: &str,
    field: &'static str,
    raw: Vec<u8>,
) -> Result<f64, LimiterError> {
    let corrupt = |value: String| LimiterError::CorruptState {
        key: key.to_string(),
        field,
        value: Some(value),
    };

    let text = String::from_utf8(raw)
        .map_err(|e| corrupt(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(corrupt(text)),
    }
}
