//! Bucketgate - Distributed Token Bucket Rate Limiting
//!
//! This crate implements per-identity rate limiting whose state lives in a
//! shared key-value store (Redis), so any number of stateless processes can
//! enforce one consistent quota per caller.

pub mod config;
pub mod error;
pub mod logging;
pub mod ratelimit;
pub mod store;
