//! Deployment context selection.
//!
//! A location hint picks which identity provider verifies a token. Only an
//! exact match on [`PRODUCTION_LOCATION`] selects production; every other
//! value, including empty and unknown strings, selects the staged provider.
//! That fallback sends unrecognised hints to the non-production trust
//! authority instead of rejecting them, so it is kept as a named policy here
//! where it can be reviewed.

use std::fmt;

use reqwest::header::HeaderValue;
use url::Url;

use crate::config::{EnvironmentSettings, IntrospectionConfig, resolve_value};
use crate::{Error, Result};

/// The only location hint that selects the production identity provider
pub const PRODUCTION_LOCATION: &str = "Prod";

/// Deployment context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production identity provider
    Production,
    /// Non-production identity provider (default for any other hint)
    Staged,
}

impl Environment {
    /// Map a free-form location hint to a deployment context
    #[must_use]
    pub fn from_location(hint: &str) -> Self {
        if hint == PRODUCTION_LOCATION {
            Self::Production
        } else {
            Self::Staged
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Staged => write!(f, "staged"),
        }
    }
}

/// Resolved identity provider settings for one deployment context.
///
/// Built once at startup and never mutated; shared read-only across requests.
#[derive(Clone)]
pub struct EnvironmentConfig {
    /// Identity provider base URL
    pub base_url: Url,
    /// Client username for HTTP Basic auth
    pub client_username: String,
    /// Client password for HTTP Basic auth
    pub client_password: String,
    /// Pre-shared `Authorization` header value
    pub authorization_header: Option<String>,
}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field("base_url", &self.base_url.as_str())
            .field("client_username", &self.client_username)
            .field("client_password", &"<redacted>")
            .field(
                "authorization_header",
                &self.authorization_header.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl EnvironmentConfig {
    /// Resolve `env:` references and validate the base URL
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the base URL is unset or not a valid URL, or the
    /// pre-shared header cannot be sent as an HTTP header value.
    pub fn from_settings(name: Environment, settings: &EnvironmentSettings) -> Result<Self> {
        let raw_url = resolve_value(&settings.base_url).ok_or_else(|| {
            Error::Config(format!(
                "introspection.{name}.base_url is not set ({})",
                settings.base_url
            ))
        })?;
        let base_url = Url::parse(&raw_url).map_err(|e| {
            Error::Config(format!("introspection.{name}.base_url is invalid: {e}"))
        })?;

        let authorization_header = settings
            .authorization_header
            .as_deref()
            .and_then(resolve_value);
        if let Some(value) = authorization_header.as_deref() {
            HeaderValue::from_str(value).map_err(|_| {
                Error::Config(format!(
                    "introspection.{name}.authorization_header is not a valid header value"
                ))
            })?;
        }

        Ok(Self {
            base_url,
            client_username: resolve_value(&settings.client_username).unwrap_or_default(),
            client_password: resolve_value(&settings.client_password).unwrap_or_default(),
            authorization_header,
        })
    }

    /// Introspection endpoint for this identity provider
    #[must_use]
    pub fn introspect_url(&self) -> String {
        format!(
            "{}/v1/introspect",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

/// Maps location hints to identity provider settings
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    production: EnvironmentConfig,
    staged: EnvironmentConfig,
}

impl EnvironmentResolver {
    /// Create a resolver from already-resolved settings
    #[must_use]
    pub fn new(production: EnvironmentConfig, staged: EnvironmentConfig) -> Self {
        Self { production, staged }
    }

    /// Resolve both deployment contexts from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if either context's base URL is missing or invalid.
    pub fn from_config(config: &IntrospectionConfig) -> Result<Self> {
        Ok(Self::new(
            EnvironmentConfig::from_settings(Environment::Production, &config.production)?,
            EnvironmentConfig::from_settings(Environment::Staged, &config.staged)?,
        ))
    }

    /// Settings for a location hint
    #[must_use]
    pub fn resolve(&self, hint: &str) -> (Environment, &EnvironmentConfig) {
        let environment = Environment::from_location(hint);
        let config = match environment {
            Environment::Production => &self.production,
            Environment::Staged => &self.staged,
        };
        (environment, config)
    }
}
