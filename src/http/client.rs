//! HTTP client with retry and rate limiting
//!
//! Every request to the service goes through [`HttpClient::request`], which:
//! - waits on the shared rate limiter before each attempt
//! - attaches a bearer token, re-exchanging it once when the service rejects it
//! - retries throttling, server errors and network failures with jittered
//!   exponential backoff, bounded by both an attempt count and wall time
//! - classifies everything else into the error taxonomy

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::types::{BackoffType, QueryParams};
use rand::Rng;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Total wall time a single logical request may spend retrying
    pub max_elapsed: Duration,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Randomize each delay between half and all of the computed backoff
    pub jitter: bool,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(10),
            max_retries: 10,
            max_elapsed: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_type: BackoffType::Exponential,
            jitter: true,
            rate_limit: Some(RateLimiterConfig::default()),
            user_agent: format!("hubspot-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the wall-time ceiling for retries
    pub fn max_elapsed(mut self, elapsed: Duration) -> Self {
        self.config.max_elapsed = elapsed;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Disable jitter so delays are deterministic
    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = false;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: QueryParams,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Statuses handed back to the caller as `HttpStatus` without retrying
    pub passthrough: Vec<u16>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Replace all query parameters
    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Let the caller handle `status` itself
    #[must_use]
    pub fn passthrough(mut self, status: u16) -> Self {
        self.passthrough.push(status);
        self
    }
}

/// HTTP client with retry and rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .expect("Failed to build HTTP client");

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Self {
            client,
            config,
            authenticator: None,
            rate_limiter,
        }
    }

    /// Create a client with authentication
    pub fn with_auth(config: HttpClientConfig, auth_config: AuthConfig) -> Self {
        let mut client = Self::with_config(config);
        client.set_authenticator(auth_config);
        client
    }

    /// Set the authenticator
    pub fn set_authenticator(&mut self, auth_config: AuthConfig) {
        self.authenticator = Some(Authenticator::with_client(auth_config, self.client.clone()));
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, query: QueryParams) -> Result<Response> {
        self.request(Method::GET, url, RequestConfig::new().with_query(query))
            .await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, body: Value) -> Result<Response> {
        self.request(Method::POST, url, RequestConfig::new().json(body))
            .await
    }

    /// Make a request and decode its body as JSON.
    ///
    /// An empty body decodes to `Value::Null`. A body that is not JSON is
    /// logged verbatim and reported as [`Error::MalformedResponse`].
    pub async fn execute(&self, method: Method, url: &str, config: RequestConfig) -> Result<Value> {
        let response = self.request(method, url, config).await?;
        let body = response.text().await.map_err(Error::Http)?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(url, error = %e, body = %body, "Response body is not valid JSON");
            Error::malformed(url, body)
        })
    }

    /// GET and decode JSON
    pub async fn get_json(&self, url: &str, query: QueryParams) -> Result<Value> {
        self.execute(Method::GET, url, RequestConfig::new().with_query(query))
            .await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json(&self, url: &str, body: Value) -> Result<Value> {
        self.execute(Method::POST, url, RequestConfig::new().json(body))
            .await
    }

    /// Check that a GET to `url` succeeds, discarding the body
    pub async fn probe(&self, url: &str, query: QueryParams) -> Result<()> {
        self.get(url, query).await.map(drop)
    }

    /// Make a generic request
    #[allow(clippy::too_many_lines)]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let full_url = self.build_url(url);
        let max_retries = self.config.max_retries;
        let timeout = self.config.timeout;
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;

        let started = Instant::now();
        let mut last_error = None;
        let mut attempt = 0;
        let mut reauthenticated = false;

        while attempt <= max_retries {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self
                .client
                .request(method.clone(), &full_url)
                .timeout(timeout);

            if !config.query.is_empty() {
                req = req.query(&config.query);
            }
            if let Some(ref body) = config.body {
                req = req.json(body);
            }

            if let Some(ref auth) = self.authenticator {
                req = match auth.apply(req).await {
                    Ok(req) => req,
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        let delay = self.retry_delay(attempt);
                        if !self.within_budget(started, delay) {
                            return Err(e);
                        }
                        warn!(
                            "Token exchange failed, attempt {}/{}, retrying in {:?}: {e}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED {
                        let body = response.text().await.unwrap_or_default();
                        match self.authenticator {
                            Some(ref auth) if auth.can_refresh() && !reauthenticated => {
                                info!("Access token rejected, exchanging refresh token");
                                auth.invalidate().await;
                                reauthenticated = true;
                                continue;
                            }
                            _ => {
                                return Err(Error::invalid_credentials(format!(
                                    "{method} {full_url} returned 401: {body}"
                                )));
                            }
                        }
                    }
                    reauthenticated = false;

                    if status == StatusCode::FORBIDDEN {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::missing_scope(format!(
                            "{method} {full_url} returned 403: {body}"
                        )));
                    }

                    if config.passthrough.contains(&status.as_u16()) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::http_status(status.as_u16(), body));
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let delay = extract_retry_after(&response)
                            .unwrap_or_else(|| self.retry_delay(attempt));
                        if attempt < max_retries && self.within_budget(started, delay) {
                            warn!(
                                "Rate limited (429), attempt {}/{}, waiting {:?}",
                                attempt + 1,
                                max_retries + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(Error::RateLimited {
                            retry_after_seconds: delay.as_secs(),
                        });
                    }

                    if is_retryable_status(status) && attempt < max_retries {
                        let delay = self.retry_delay(attempt);
                        if self.within_budget(started, delay) {
                            warn!(
                                "Request failed with {}, attempt {}/{}, retrying in {:?}",
                                status.as_u16(),
                                attempt + 1,
                                max_retries + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            last_error = Some(Error::http_status(status.as_u16(), ""));
                            continue;
                        }
                    }

                    if status.is_client_error() || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::http_status(status.as_u16(), body));
                    }

                    debug!("Request succeeded: {} {}", method, full_url);
                    return Ok(response);
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    let delay = self.retry_delay(attempt);

                    if transient && attempt < max_retries && self.within_budget(started, delay) {
                        warn!(
                            "Network error, attempt {}/{}, retrying in {:?}: {e}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(if e.is_timeout() {
                            Error::Timeout { timeout_ms }
                        } else {
                            Error::Http(e)
                        });
                        continue;
                    }

                    if e.is_timeout() {
                        return Err(Error::Timeout { timeout_ms });
                    }
                    return Err(Error::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_retries }))
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }

    fn within_budget(&self, started: Instant, delay: Duration) -> bool {
        started.elapsed() + delay <= self.config.max_elapsed
    }

    /// Backoff for `attempt`, with equal jitter applied when enabled
    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = self.calculate_backoff(attempt);
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        half + rand::thread_rng().gen_range(Duration::ZERO..=half)
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff.saturating_mul(attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.config.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Check if an HTTP status is retryable
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500..=599)
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
