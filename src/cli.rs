//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Authentication gateway - token introspection and LDAP bind verification
#[derive(Parser, Debug)]
#[command(name = "auth-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTH_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTH_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTH_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "AUTH_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTH_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Introspect a single token and print the verdict (exit 0 iff active)
    Introspect {
        /// Location hint selecting the identity provider (e.g. Prod)
        #[arg(short, long, default_value = "")]
        location: String,

        /// Access token to check
        #[arg(short, long, required = true)]
        token: String,
    },

    /// Authenticate a single user against the directory (exit 0 iff authenticated)
    Ldap {
        /// Directory username
        #[arg(short, long, required = true)]
        username: String,

        /// Password (prefer the environment variable over the command line)
        #[arg(long, env = "AUTH_GATEWAY_LDAP_PASSWORD", hide_env_values = true)]
        password: String,
    },
}
