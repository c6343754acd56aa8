//! Authentication Gateway
//!
//! Token introspection and LDAP bind verification in front of HTTP endpoints.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use auth_gateway::{
    auth::{
        DirectoryAuthenticator, DirectoryOutcome, EnvironmentResolver, IntrospectionClient,
        TokenVerifier,
    },
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Introspect { location, token }) => {
            run_introspect(&config, &location, &token).await
        }
        Some(Command::Ldap { username, password }) => {
            run_ldap(&config, &username, &password).await
        }
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// One-shot token check
async fn run_introspect(config: &Config, location: &str, token: &str) -> ExitCode {
    let verifier = match build_verifier(config) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("❌ Invalid introspection configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match verifier.verify(token, location).await {
        Ok(verdict) => {
            match serde_json::to_string_pretty(&serde_json::json!({ "introspect": verdict })) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("❌ Failed to serialize verdict: {e}"),
            }
            if verdict.active {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("❌ Introspection failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_verifier(config: &Config) -> auth_gateway::Result<TokenVerifier> {
    let resolver = EnvironmentResolver::from_config(&config.introspection)?;
    let client = IntrospectionClient::new(config.introspection.timeout)?;
    Ok(TokenVerifier::new(resolver, client))
}

/// One-shot directory authentication
async fn run_ldap(config: &Config, username: &str, password: &str) -> ExitCode {
    if let Err(e) = config.directory.validate() {
        eprintln!("❌ Invalid directory configuration: {e}");
        return ExitCode::FAILURE;
    }

    let authenticator = DirectoryAuthenticator::from_config(&config.directory);
    match authenticator.authenticate(username, password).await {
        DirectoryOutcome::Authenticated { dn } => {
            println!("✅ {username} authenticated as {dn}");
            ExitCode::SUCCESS
        }
        DirectoryOutcome::Denied(reason) => {
            eprintln!("❌ {username} denied: {reason}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        introspection = config.introspection.enabled,
        directory = config.directory.enabled,
        "Starting Auth Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
