//! Authentication Gateway Library
//!
//! Guards HTTP endpoints with one of two verification strategies.
//!
//! # Features
//!
//! - **Token introspection**: OAuth2 token check against an identity provider,
//!   with the provider selected per request by a location hint
//! - **Directory authentication**: two-phase LDAP bind (service bind + search,
//!   then user bind) for `Authorization: Basic` credentials
//! - **Fail closed**: every verification failure ends in a deny
//! - **Production Ready**: bounded timeouts, structured logging, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))?,
    }

    Ok(())
}
