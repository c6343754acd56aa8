//! Error types for the authentication gateway

use std::io;

use thiserror::Error;

/// Result type alias for the authentication gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// Verification failures are not represented here: they resolve to a deny
/// decision at the gate. These variants cover startup and plumbing failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("filter must contain %s".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: filter must contain %s"
        );
    }
}
