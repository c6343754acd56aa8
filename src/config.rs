//! Configuration management
//!
//! Configuration is loaded once at startup from an optional YAML file merged
//! with `AUTH_GATEWAY_`-prefixed environment variables. Values that name
//! secrets or upstream endpoints may be written as `env:VAR_NAME`; the
//! defaults point at the legacy `OKTA_*` variables so an existing `.env`
//! keeps working unchanged.
//!
//! # Example YAML
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! introspection:
//!   timeout: 5s
//!   production:
//!     base_url: https://example.okta.com/oauth2/default
//!     client_username: env:OKTA_PROD_USERNAME
//!     client_password: env:OKTA_PROD_PASSWD
//! directory:
//!   enabled: true
//!   server: ldap.example.com:636
//!   base_dn: dc=example,dc=com
//!   bind_dn: cn=svc-auth,dc=example,dc=com
//!   bind_password: env:LDAP_BIND_PASSWORD
//!   filter: (sAMAccountName=%s)
//! ```

use std::{env, path::Path, sync::LazyLock, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Placeholder in the directory filter template replaced by the username
pub const FILTER_PLACEHOLDER: &str = "%s";

/// `${VAR}` or `${VAR:-default}`
static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("env pattern is a valid regex")
});

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving `env:` references.
    /// Paths support ~ expansion. Loaded in order; missing files are skipped.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token introspection configuration
    pub introspection: IntrospectionConfig,
    /// Directory (LDAP) configuration
    pub directory: DirectoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: vec![".env".to_string()],
            server: ServerConfig::default(),
            introspection: IntrospectionConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Token introspection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectionConfig {
    /// Enable the token introspection routes
    pub enabled: bool,
    /// Upper bound on a single introspection call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Identity provider used when the location hint is the production tag
    pub production: EnvironmentSettings,
    /// Identity provider used for every other location hint
    pub staged: EnvironmentSettings,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(10),
            production: EnvironmentSettings::from_env_prefix("OKTA_PROD"),
            staged: EnvironmentSettings::from_env_prefix("OKTA_STAGED"),
        }
    }
}

/// Unresolved identity provider settings for one deployment context
///
/// Every field accepts `env:VAR_NAME`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// Identity provider base URL (`/v1/introspect` is appended)
    pub base_url: String,
    /// Client username for HTTP Basic auth
    pub client_username: String,
    /// Client password for HTTP Basic auth
    pub client_password: String,
    /// Pre-shared `Authorization` header value
    pub authorization_header: Option<String>,
}

impl EnvironmentSettings {
    /// Settings that read `{prefix}`, `{prefix}_USERNAME`, `{prefix}_PASSWD`
    /// and `{prefix}_BASIC` from the environment
    #[must_use]
    pub fn from_env_prefix(prefix: &str) -> Self {
        Self {
            base_url: format!("env:{prefix}"),
            client_username: format!("env:{prefix}_USERNAME"),
            client_password: format!("env:{prefix}_PASSWD"),
            authorization_header: Some(format!("env:{prefix}_BASIC")),
        }
    }
}

/// Directory (LDAP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Enable the directory authentication route
    pub enabled: bool,
    /// Directory server address (`host:port`, or a full `ldap://`/`ldaps://` URL)
    pub server: String,
    /// Search base DN
    pub base_dn: String,
    /// Service account DN used for the search bind (empty = anonymous search)
    pub bind_dn: String,
    /// Service account password (supports `env:VAR_NAME`)
    pub bind_password: String,
    /// Search filter template, e.g. `(sAMAccountName=%s)`
    pub filter: String,
    /// Connect over TLS (`ldaps://`)
    pub use_tls: bool,
    /// Skip server certificate verification
    pub insecure_skip_verify: bool,
    /// Upper bound on connect and on each directory operation
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            base_dn: String::new(),
            bind_dn: String::new(),
            bind_password: String::new(),
            filter: String::new(),
            use_tls: true,
            insecure_skip_verify: false,
            timeout: Duration::from_secs(10),
        }
    }
}

impl DirectoryConfig {
    /// LDAP URL for the configured server
    #[must_use]
    pub fn url(&self) -> String {
        if self.server.contains("://") {
            self.server.clone()
        } else if self.use_tls {
            format!("ldaps://{}", self.server)
        } else {
            format!("ldap://{}", self.server)
        }
    }

    /// Resolve the service account password (expand `env:` references)
    #[must_use]
    pub fn resolve_bind_password(&self) -> String {
        resolve_value(&self.bind_password).unwrap_or_default()
    }

    /// Check the values a directory bind cannot run without
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the first missing value, or a filter
    /// without the username placeholder.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("server", &self.server),
            ("base_dn", &self.base_dn),
            ("filter", &self.filter),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("directory.{field} is required")));
            }
        }
        if !self.filter.contains(FILTER_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "directory.filter must contain '{FILTER_PLACEHOLDER}': {}",
                self.filter
            )));
        }
        Ok(())
    }
}

/// Resolve a configuration value.
///
/// `env:VAR_NAME` reads the variable and yields `None` when it is unset or
/// empty; any other non-empty value is returned as-is.
#[must_use]
pub fn resolve_value(value: &str) -> Option<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).ok()?,
        None => value.to_string(),
    };
    if resolved.is_empty() {
        None
    } else {
        Some(resolved)
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // AUTH_GATEWAY_DIRECTORY__BASE_DN -> directory.base_dn
        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();

        Ok(config)
    }

    /// Check the enabled sections for values the gateway cannot run without
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid value.
    pub fn validate(&self) -> Result<()> {
        if !self.introspection.enabled && !self.directory.enabled {
            return Err(Error::Config(
                "at least one of introspection or directory must be enabled".to_string(),
            ));
        }
        if self.directory.enabled {
            self.directory.validate()?;
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        for settings in [
            &mut self.introspection.production,
            &mut self.introspection.staged,
        ] {
            settings.base_url = expand_string(&settings.base_url);
            settings.client_username = expand_string(&settings.client_username);
            settings.client_password = expand_string(&settings.client_password);
            if let Some(header) = settings.authorization_header.as_mut() {
                *header = expand_string(header);
            }
        }

        let directory = &mut self.directory;
        for value in [
            &mut directory.server,
            &mut directory.base_dn,
            &mut directory.bind_dn,
            &mut directory.bind_password,
            &mut directory.filter,
        ] {
            *value = expand_string(value);
        }
    }
}

/// Expand environment variables in a string
fn expand_string(value: &str) -> String {
    ENV_PATTERN
        .replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}
