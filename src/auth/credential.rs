//! Credential extraction from inbound requests.
//!
//! Pure parsing, no I/O. Each verification path knows which credential it
//! expects, so the two shapes are separate types:
//!
//! - [`IntrospectRequest`]: a JSON body `{"Location": "...", "token": "..."}`
//! - [`BasicCredentials`]: an `Authorization: Basic <base64(username:password)>` header

use std::fmt;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Credential extraction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// No credential was presented; the caller must issue a challenge
    #[error("missing credential")]
    Missing,

    /// A credential was presented but could not be parsed
    #[error("malformed credential: {0}")]
    Malformed(String),
}

/// Bearer token credential: the JSON body accepted by the introspection
/// endpoints, `{"Location": "...", "token": "..."}`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectRequest {
    /// Deployment context hint (e.g. `Prod`, `Staged`)
    #[serde(rename = "Location", alias = "location", default)]
    pub location: String,
    /// Access token to introspect
    pub token: String,
}

impl fmt::Debug for IntrospectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectRequest")
            .field("location", &self.location)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl IntrospectRequest {
    /// Parse an introspection request body
    ///
    /// # Errors
    ///
    /// [`CredentialError::Malformed`] if the body is not valid JSON of the
    /// expected shape or the token is empty.
    pub fn from_body(body: &[u8]) -> Result<Self, CredentialError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| CredentialError::Malformed(format!("invalid request body: {e}")))?;

        if request.token.trim().is_empty() {
            return Err(CredentialError::Malformed("empty token".to_string()));
        }
        Ok(request)
    }
}

/// Username/password credential from an `Authorization: Basic` header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Directory username (not a DN)
    pub username: String,
    /// Plain-text password
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    /// Extract a username/password pair from the `Authorization` header
    ///
    /// # Errors
    ///
    /// - [`CredentialError::Missing`] if there is no `Authorization` header
    /// - [`CredentialError::Malformed`] if the header is not the Basic scheme,
    ///   is not valid base64, or does not decode to `username:password`
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CredentialError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Err(CredentialError::Missing);
        };
        let value = value
            .to_str()
            .map_err(|_| CredentialError::Malformed("non-ASCII authorization header".to_string()))?;
        if value.trim().is_empty() {
            return Err(CredentialError::Missing);
        }

        let encoded = strip_scheme(value, "Basic")
            .ok_or_else(|| CredentialError::Malformed("not a Basic credential".to_string()))?;

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CredentialError::Malformed(format!("invalid base64: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| CredentialError::Malformed("credential is not UTF-8".to_string()))?;

        let Some((username, password)) = decoded.split_once(':') else {
            return Err(CredentialError::Malformed(
                "credential is not username:password".to_string(),
            ));
        };

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Strip a case-insensitive auth scheme followed by a space
fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (candidate, rest) = value.split_at_checked(scheme.len())?;
    if !candidate.eq_ignore_ascii_case(scheme) {
        return None;
    }
    rest.strip_prefix(' ')
}
