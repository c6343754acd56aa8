//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::auth::{DirectoryAuthenticator, EnvironmentResolver, IntrospectionClient, TokenVerifier};
use crate::config::Config;
use crate::{Error, Result};

/// Authentication gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared handler state
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a new gateway
    ///
    /// Validates the configuration and resolves the identity provider
    /// settings once; nothing is read from the environment after this.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let token_verifier = if config.introspection.enabled {
            let resolver = EnvironmentResolver::from_config(&config.introspection)?;
            let client = IntrospectionClient::new(config.introspection.timeout)?;
            Some(Arc::new(TokenVerifier::new(resolver, client)))
        } else {
            None
        };

        let directory = config
            .directory
            .enabled
            .then(|| Arc::new(DirectoryAuthenticator::from_config(&config.directory)));

        let state = Arc::new(AppState {
            token_verifier,
            directory,
            cors_origins: config.server.cors_origins.clone(),
        });

        Ok(Self { config, state })
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        let base = format!("http://{}:{}", self.config.server.host, self.config.server.port);
        info!("============================================================");
        info!("AUTH GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");

        if self.state.token_verifier.is_some() {
            info!("TOKEN INTROSPECTION:");
            info!("  POST {base}/okta/introspect       (report)");
            info!("  POST {base}/auth/okta/introspect  (gated)");
        } else {
            warn!("Token introspection disabled");
        }

        if self.state.directory.is_some() {
            info!(server = %self.config.directory.url(), "DIRECTORY (LDAP):");
            info!("  ANY  {base}/ldap/auth");
            if self.config.directory.insecure_skip_verify {
                warn!("Directory certificate verification is disabled");
            }
        }
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
