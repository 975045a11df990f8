//! HTTP plumbing for external services.
//!
//! Provides the blocking client, the shared error type, retry with
//! exponential backoff and fixed-delay rate limiting.

mod client;
mod retry;

pub use client::{HttpClient, HttpError};
pub use retry::{RateLimiter, RetryPolicy};
