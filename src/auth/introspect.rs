//! Remote token introspection.
//!
//! Issues `POST {base_url}/v1/introspect` with a form body of
//! `token=<token>&token_type_hint=access_token` and parses the identity
//! provider's JSON answer into an [`IntrospectionVerdict`].
//!
//! Calls are one-shot: no retries, no backoff. Each call is bounded by the
//! configured timeout, and a timeout counts as the upstream being unreachable.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::environment::EnvironmentConfig;

/// Introspection call failure
#[derive(Debug, Error)]
pub enum IntrospectError {
    /// Connect failure, timeout, or other transport error
    #[error("identity provider unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The identity provider answered with a non-2xx status
    #[error("identity provider returned HTTP {status}")]
    UpstreamError {
        /// HTTP status returned by the identity provider
        status: StatusCode,
    },

    /// The response body is not an introspection document
    #[error("invalid introspection response: {0}")]
    InvalidUpstreamResponse(String),
}

/// Identity provider's verdict on a token.
///
/// `active` is the only field that decides access; the rest is informational.
/// Unknown claims are kept in `extra` and echoed back to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionVerdict {
    /// Whether the token is currently valid
    #[serde(default)]
    pub active: bool,
    /// Space-separated granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Resource owner username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Expiry (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience (string or array, depending on the provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Token type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// OAuth client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Provider user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// User mail address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    /// Any other claims returned by the provider
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl IntrospectionVerdict {
    /// A verdict that never authorizes
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Token expiry as a timestamp
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// HTTP client for an identity provider's introspection endpoint
#[derive(Debug, Clone)]
pub struct IntrospectionClient {
    http: Client,
}

impl IntrospectionClient {
    /// Create a client whose calls are bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Ask the identity provider whether `token` is active
    pub async fn introspect(
        &self,
        config: &EnvironmentConfig,
        token: &str,
    ) -> Result<IntrospectionVerdict, IntrospectError> {
        let url = config.introspect_url();
        debug!(url = %url, "Introspecting token");

        let mut request = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&[("token", token), ("token_type_hint", "access_token")]);

        // The pre-shared header is what the provider expects as the client
        // credential; Basic auth from username/password is the fallback.
        request = match config.authorization_header.as_deref() {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request.basic_auth(&config.client_username, Some(&config.client_password)),
        };

        let response = request
            .send()
            .await
            .map_err(|e| IntrospectError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntrospectError::UpstreamError { status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IntrospectError::UpstreamUnreachable(e.to_string()))?;

        serde_json::from_slice(&body)
            .map_err(|e| IntrospectError::InvalidUpstreamResponse(e.to_string()))
    }
}
