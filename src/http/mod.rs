//! HTTP access layer
//!
//! Provides the HTTP client every stream talks through.
//!
//! # Features
//!
//! - **Automatic Retries**: jittered exponential backoff for 429, 5xx and network failures
//! - **Rate Limiting**: rolling-window limiter using governor (100 calls / 10 s by default)
//! - **Authentication**: bearer token attachment with transparent re-exchange on 401
//! - **Classification**: 401 and 403 surface as `InvalidCredentials` and `MissingScope`

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
