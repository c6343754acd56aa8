//! Token verification: location hint -> identity provider -> verdict.

use tracing::{debug, warn};

use super::environment::EnvironmentResolver;
use super::introspect::{IntrospectError, IntrospectionClient, IntrospectionVerdict};

/// Verifies bearer tokens against the identity provider selected by their
/// location hint
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    resolver: EnvironmentResolver,
    client: IntrospectionClient,
}

impl TokenVerifier {
    /// Create a verifier
    #[must_use]
    pub fn new(resolver: EnvironmentResolver, client: IntrospectionClient) -> Self {
        Self { resolver, client }
    }

    /// Introspect `token` against the provider for `location`.
    ///
    /// A response that does not parse yields an inactive verdict instead of
    /// an error: an unreadable answer never authorizes. Transport and status
    /// failures are returned so the caller can report them; the gate denies
    /// on them all the same.
    pub async fn verify(
        &self,
        token: &str,
        location: &str,
    ) -> Result<IntrospectionVerdict, IntrospectError> {
        let (environment, config) = self.resolver.resolve(location);
        debug!(location = %location, environment = %environment, "Resolved identity provider");

        match self.client.introspect(config, token).await {
            Ok(verdict) => {
                debug!(
                    environment = %environment,
                    active = verdict.active,
                    sub = verdict.sub.as_deref().unwrap_or(""),
                    expires_at = ?verdict.expires_at(),
                    "Introspection verdict"
                );
                Ok(verdict)
            }
            Err(IntrospectError::InvalidUpstreamResponse(reason)) => {
                warn!(environment = %environment, reason = %reason, "Unparseable introspection response, treating token as inactive");
                Ok(IntrospectionVerdict::inactive())
            }
            Err(e) => {
                warn!(environment = %environment, error = %e, "Introspection failed");
                Err(e)
            }
        }
    }
}
