//! Typed clients for the Scaleway public APIs.
//!
//! Each service module exposes request/response types and a thin client
//! over the shared [`ApiClient`]. The clients translate HTTP errors into
//! [`ApiError`] values carrying the status code and body so controllers can
//! distinguish "gone" (404, and 403 on the endpoints that encode deletion
//! that way) from real failures.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::transport::{RequestSpec, RetryPolicy, RetryTransport, TransportError};

pub mod applesilicon;
pub mod batch;
pub mod billing;
pub mod domain;
pub mod flexip;
pub mod instance;
pub mod iot;
pub mod ipam;
pub mod lb;
pub mod mnq;
pub mod object;
pub mod rdb;
pub mod vpc;

/// Default base URL for the Scaleway public API.
pub const DEFAULT_BASE_URL: &str = "https://api.scaleway.com";

/// Credentials and defaults resolved by the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Access key, captured for audit purposes; not needed for API calls.
    pub access_key: Option<String>,
    /// Secret key sent as `X-Auth-Token` on every request.
    pub secret_key: String,
    /// Project used when a request does not name one.
    pub default_project_id: String,
    /// Organisation identifier required by a few endpoints.
    pub default_organization_id: Option<String>,
}

/// Errors raised by the typed clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Raised when the transport exhausted its retries.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Raised when the API answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },
    /// Raised when a response body could not be decoded.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Decoder error message.
        message: String,
    },
}

impl ApiError {
    /// Returns the HTTP status, when the error carries one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 404 responses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    /// True when the response should be read as "the resource is gone".
    ///
    /// 404 always qualifies. 403 qualifies only for the endpoints known to
    /// encode deletion as a permission error (instance IPs, flexible IPs);
    /// those callers pass `forbidden_means_gone`.
    #[must_use]
    pub const fn is_gone(&self, forbidden_means_gone: bool) -> bool {
        match self.status() {
            Some(404) => true,
            Some(403) => forbidden_means_gone,
            _ => false,
        }
    }

    /// True for 409 responses, retried by controllers that know the conflict
    /// is transient.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(409))
    }

    /// True for 412 responses, raised when a server action races a
    /// concurrent state change.
    #[must_use]
    pub const fn is_precondition_failed(&self) -> bool {
        matches!(self.status(), Some(412))
    }
}

/// Shared HTTP client carrying credentials and the base URL.
#[derive(Clone, Debug)]
pub struct ApiClient {
    transport: RetryTransport,
    base_url: String,
    credentials: Credentials,
}

impl ApiClient {
    /// Builds a client against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the transport cannot be built.
    pub fn new(credentials: Credentials, policy: RetryPolicy) -> Result<Self, ApiError> {
        Self::with_base_url(credentials, policy, DEFAULT_BASE_URL)
    }

    /// Builds a client against a non-default base URL (region-scoped
    /// services, test servers).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the transport cannot be built.
    pub fn with_base_url(
        credentials: Credentials,
        policy: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let transport = RetryTransport::new(&credentials.secret_key, policy)?;
        Ok(Self {
            transport,
            base_url: base_url.into(),
            credentials,
        })
    }

    /// Returns the resolved credentials.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the base URL this client targets.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a copy of this client pointed at a different base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the transport cannot be rebuilt.
    pub fn rebased(&self, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            transport: self.transport.clone(),
            base_url: base_url.into(),
            credentials: self.credentials.clone(),
        })
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut spec = RequestSpec::new(Method::GET, format!("{}{path}", self.base_url));
        for (key, value) in query {
            spec = spec.with_query(*key, value.clone());
        }
        self.run(spec).await
    }

    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = serde_json::to_value(body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })?;
        let spec =
            RequestSpec::new(Method::POST, format!("{}{path}", self.base_url)).with_body(payload);
        self.run(spec).await
    }

    pub(crate) async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = serde_json::to_value(body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })?;
        let spec =
            RequestSpec::new(Method::PATCH, format!("{}{path}", self.base_url)).with_body(payload);
        self.run(spec).await
    }

    pub(crate) async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = serde_json::to_value(body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })?;
        let spec =
            RequestSpec::new(Method::PUT, format!("{}{path}", self.base_url)).with_body(payload);
        self.run(spec).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let spec = RequestSpec::new(Method::DELETE, format!("{}{path}", self.base_url));
        let response = self.transport.execute(&spec).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn run<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, ApiError> {
        let response = self.transport.execute(&spec).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.json::<T>().await.map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests;
