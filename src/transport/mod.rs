//! Retrying JSON transport over `reqwest`.
//!
//! Transient network failures and HTTP 429 responses are retried with
//! exponential back-off. Every other response is returned to the caller
//! regardless of status so the typed clients can surface domain errors.
//! Requests are described by a [`RequestSpec`] holding a buffered JSON body,
//! which makes every request replayable; there is no streaming-body path.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use thiserror::Error;
use tokio::time::sleep;

/// How many attempts a request gets before the transport gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// First back-off pause between attempts.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(2);
/// Upper bound on the back-off pause.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Retry parameters for the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per request.
    pub max_attempts: u32,
    /// Initial pause between attempts; doubles each retry.
    pub min_wait: Duration,
    /// Cap applied to the pause.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Returns the pause before the given retry (zero-based attempt index).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }
}

/// A fully-buffered request the transport can replay on retry.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Optional JSON body, buffered once.
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    /// Builds a body-less request.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Errors raised by the transport once retries are exhausted.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Raised when the HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    /// Raised when every attempt failed with a transport-level error.
    #[error("request to {url} failed after {attempts} attempts: {message}")]
    Exhausted {
        /// URL of the failing request.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Final transport error message.
        message: String,
    },
    /// Raised when every attempt was answered with HTTP 429.
    #[error("request to {url} rate-limited after {attempts} attempts")]
    RateLimited {
        /// URL of the failing request.
        url: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

/// HTTP transport with bounded retries on transient failures and 429s.
#[derive(Clone, Debug)]
pub struct RetryTransport {
    client: Client,
    policy: RetryPolicy,
}

impl RetryTransport {
    /// Builds a transport authenticating every request with the given secret
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] when the underlying client cannot
    /// be constructed.
    pub fn new(secret_key: &str, policy: RetryPolicy) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let mut token =
            HeaderValue::from_str(secret_key).map_err(|_| TransportError::Exhausted {
                url: String::new(),
                attempts: 0,
                message: String::from("secret key contains non-header characters"),
            })?;
        token.set_sensitive(true);
        headers.insert("X-Auth-Token", token);
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client, policy })
    }

    /// Builds a transport from an existing client, used by tests.
    #[must_use]
    pub const fn from_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Executes a request, retrying transient failures and 429 responses.
    ///
    /// Any other response is returned as-is; status handling belongs to the
    /// typed clients.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Exhausted`] or
    /// [`TransportError::RateLimited`] once the attempt budget is spent.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response, TransportError> {
        let mut last_message = String::new();
        let mut rate_limited = false;
        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                sleep(self.policy.backoff(attempt - 1)).await;
            }
            match self.send_once(spec).await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited = true;
                    tracing::debug!(url = %spec.url, attempt, "rate limited, backing off");
                }
                Ok(response) => return Ok(response),
                Err(err) if is_transient(&err) => {
                    rate_limited = false;
                    last_message = err.to_string();
                    tracing::debug!(url = %spec.url, attempt, error = %err, "transient failure, retrying");
                }
                Err(err) => {
                    return Err(TransportError::Exhausted {
                        url: spec.url.clone(),
                        attempts: attempt + 1,
                        message: err.to_string(),
                    });
                }
            }
        }
        if rate_limited {
            Err(TransportError::RateLimited {
                url: spec.url.clone(),
                attempts: self.policy.max_attempts,
            })
        } else {
            Err(TransportError::Exhausted {
                url: spec.url.clone(),
                attempts: self.policy.max_attempts,
                message: last_message,
            })
        }
    }

    async fn send_once(&self, spec: &RequestSpec) -> Result<Response, reqwest::Error> {
        let mut request = self.client.request(spec.method.clone(), &spec.url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request.send().await
    }
}

/// Connection and timeout failures are worth retrying; anything the server
/// actually answered is not.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

#[cfg(test)]
mod tests;
