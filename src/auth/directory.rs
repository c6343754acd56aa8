//! Directory (LDAP) username/password authentication.
//!
//! # Protocol
//!
//! 1. Connect (`ldaps://` or `ldap://`) and bind as the service account.
//! 2. Search the base DN (whole subtree, never dereference aliases) with the
//!    filter template, the escaped username substituted for `%s`.
//! 3. Require exactly one entry. Zero or several matches deny: a username
//!    that does not identify a unique entry is never authenticated.
//! 4. Bind as the matched entry's DN with the supplied password. That bind
//!    succeeding is the only authentication signal.
//!
//! Every failure is a deny, logged once and never retried. A fresh connection
//! is opened per attempt and unbound afterwards.
//!
//! The connection itself sits behind [`DirectoryConnector`] /
//! [`DirectorySession`]; [`Ldap3Connector`] is the production implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    DerefAliases, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions,
    ldap_escape,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{DirectoryConfig, FILTER_PLACEHOLDER};

/// Failure inside a directory session
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Could not establish a connection
    #[error("connect failed: {0}")]
    Connect(String),

    /// An operation was rejected or failed on the wire
    #[error("{0}")]
    Operation(String),
}

/// A search result entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry
    pub dn: String,
}

/// An open directory connection
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind as `dn`
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Whole-subtree search under `base_dn`, aliases never dereferenced
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Close the session
    async fn unbind(&mut self);
}

/// Opens directory sessions
#[async_trait]
pub trait DirectoryConnector: Send + Sync + 'static {
    /// Open a new session
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// Why a directory authentication attempt was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Empty password; a simple bind with it would be unauthenticated
    EmptyPassword,
    /// The directory server could not be reached
    Connect(String),
    /// The service account bind was rejected
    ServiceBind(String),
    /// The user search failed
    Search(String),
    /// No entry matched the username
    NoMatch,
    /// More than one entry matched the username
    Ambiguous {
        /// Number of matching entries
        count: usize,
    },
    /// The user bind was rejected (wrong password, locked account, ...)
    UserBind(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPassword => write!(f, "empty password"),
            Self::Connect(e) => write!(f, "connecting directory server failed: {e}"),
            Self::ServiceBind(e) => write!(f, "service bind failed: {e}"),
            Self::Search(e) => write!(f, "search failed: {e}"),
            Self::NoMatch => write!(f, "no entry matched"),
            Self::Ambiguous { count } => write!(f, "{count} entries matched, expected exactly one"),
            Self::UserBind(e) => write!(f, "user bind failed: {e}"),
        }
    }
}

/// Result of a directory authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    /// The user bind succeeded
    Authenticated {
        /// DN the user bound as
        dn: String,
    },
    /// Access denied
    Denied(DenyReason),
}

impl DirectoryOutcome {
    /// Whether the attempt authenticated the user
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Two-phase bind-then-verify directory authenticator
pub struct DirectoryAuthenticator {
    base_dn: String,
    bind_dn: String,
    bind_password: String,
    filter: String,
    connector: Arc<dyn DirectoryConnector>,
}

impl fmt::Debug for DirectoryAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryAuthenticator")
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl DirectoryAuthenticator {
    /// Authenticator talking to the configured LDAP server
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector::from_config(config)))
    }

    /// Authenticator using a custom connector
    #[must_use]
    pub fn with_connector(config: &DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            base_dn: config.base_dn.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_password: config.resolve_bind_password(),
            filter: config.filter.clone(),
            connector,
        }
    }

    /// Search filter for `username`; every `%s` gets the escaped username
    #[must_use]
    pub fn filter_for(&self, username: &str) -> String {
        self.filter
            .replace(FILTER_PLACEHOLDER, &ldap_escape(username))
    }

    /// Verify a username/password pair
    pub async fn authenticate(&self, username: &str, password: &str) -> DirectoryOutcome {
        let outcome = self.try_authenticate(username, password).await;
        match &outcome {
            DirectoryOutcome::Authenticated { dn } => {
                info!(username = %username, dn = %dn, "Directory authentication succeeded");
            }
            DirectoryOutcome::Denied(reason) => {
                warn!(username = %username, reason = %reason, "Directory authentication denied");
            }
        }
        outcome
    }

    async fn try_authenticate(&self, username: &str, password: &str) -> DirectoryOutcome {
        if password.is_empty() {
            return DirectoryOutcome::Denied(DenyReason::EmptyPassword);
        }

        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => return DirectoryOutcome::Denied(DenyReason::Connect(e.to_string())),
        };

        let outcome = self.verify(session.as_mut(), username, password).await;
        session.unbind().await;
        outcome
    }

    async fn verify(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
        password: &str,
    ) -> DirectoryOutcome {
        if self.bind_dn.is_empty() {
            debug!("No service bind DN configured, searching anonymously");
        } else if let Err(e) = session.bind(&self.bind_dn, &self.bind_password).await {
            return DirectoryOutcome::Denied(DenyReason::ServiceBind(e.to_string()));
        }

        let filter = self.filter_for(username);
        debug!(base_dn = %self.base_dn, filter = %filter, "Searching directory");

        let entries = match session.search(&self.base_dn, &filter).await {
            Ok(entries) => entries,
            Err(e) => return DirectoryOutcome::Denied(DenyReason::Search(e.to_string())),
        };

        let dn = match entries.as_slice() {
            [entry] => entry.dn.clone(),
            [] => return DirectoryOutcome::Denied(DenyReason::NoMatch),
            _ => {
                return DirectoryOutcome::Denied(DenyReason::Ambiguous {
                    count: entries.len(),
                });
            }
        };
        debug!(dn = %dn, "Resolved user entry");

        match session.bind(&dn, password).await {
            Ok(()) => DirectoryOutcome::Authenticated { dn },
            Err(e) => DirectoryOutcome::Denied(DenyReason::UserBind(e.to_string())),
        }
    }
}

/// [`DirectoryConnector`] backed by `ldap3`
#[derive(Debug, Clone)]
pub struct Ldap3Connector {
    url: String,
    insecure_skip_verify: bool,
    timeout: Duration,
}

impl Ldap3Connector {
    /// Connector for the configured server
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            url: config.url(),
            insecure_skip_verify: config.insecure_skip_verify,
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_no_tls_verify(self.insecure_skip_verify);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection error");
            }
        });

        Ok(Box::new(Ldap3Session {
            ldap,
            timeout: self.timeout,
        }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    timeout: Duration,
}

fn operation_error(e: ldap3::LdapError) -> DirectoryError {
    DirectoryError::Operation(e.to_string())
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(operation_error)?
            .success()
            .map_err(operation_error)?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        // "1.1" requests no attributes; only the DN is needed
        let (entries, _result) = self
            .ldap
            .with_timeout(self.timeout)
            .with_search_options(SearchOptions::new().deref(DerefAliases::Never))
            .search(base_dn, Scope::Subtree, filter, vec!["1.1"])
            .await
            .map_err(operation_error)?
            .success()
            .map_err(operation_error)?;

        Ok(entries
            .into_iter()
            .map(|entry| DirectoryEntry {
                dn: SearchEntry::construct(entry).dn,
            })
            .collect())
    }

    async fn unbind(&mut self) {
        match tokio::time::timeout(self.timeout, self.ldap.unbind()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "LDAP unbind failed"),
            Err(_) => debug!("LDAP unbind timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    const SERVICE_DN: &str = "cn=svc,dc=example,dc=com";
    const ALICE_DN: &str = "uid=alice,ou=people,dc=example,dc=com";

    /// In-memory directory: filter -> matching DNs, DN -> password.
    #[derive(Default)]
    struct FakeDirectory {
        entries: HashMap<String, Vec<String>>,
        passwords: HashMap<String, String>,
        unreachable: bool,
        search_error: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeDirectory {
        fn new() -> Self {
            let mut dir = Self::default();
            dir.passwords
                .insert(SERVICE_DN.to_string(), "svc-pw".to_string());
            dir.passwords
                .insert(ALICE_DN.to_string(), "correct".to_string());
            dir.entries
                .insert("(uid=alice)".to_string(), vec![ALICE_DN.to_string()]);
            dir
        }
    }

    struct FakeSession {
        entries: HashMap<String, Vec<String>>,
        passwords: HashMap<String, String>,
        search_error: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DirectoryConnector for FakeDirectory {
        async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
            if self.unreachable {
                return Err(DirectoryError::Connect("connection refused".to_string()));
            }
            self.log.lock().unwrap().push("connect".to_string());
            Ok(Box::new(FakeSession {
                entries: self.entries.clone(),
                passwords: self.passwords.clone(),
                search_error: self.search_error,
                log: Arc::clone(&self.log),
            }))
        }
    }

    #[async_trait]
    impl DirectorySession for FakeSession {
        async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
            self.log.lock().unwrap().push(format!("bind {dn}"));
            if self.passwords.get(dn).is_some_and(|p| p == password) {
                Ok(())
            } else {
                Err(DirectoryError::Operation("invalidCredentials (49)".to_string()))
            }
        }

        async fn search(
            &mut self,
            base_dn: &str,
            filter: &str,
        ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("search {base_dn} {filter}"));
            if self.search_error {
                return Err(DirectoryError::Operation("noSuchObject (32)".to_string()));
            }
            Ok(self
                .entries
                .get(filter)
                .map(|dns| {
                    dns.iter()
                        .map(|dn| DirectoryEntry { dn: dn.clone() })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn unbind(&mut self) {
            self.log.lock().unwrap().push("unbind".to_string());
        }
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig {
            enabled: true,
            server: "ldap.example.com:389".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: SERVICE_DN.to_string(),
            bind_password: "svc-pw".to_string(),
            filter: "(uid=%s)".to_string(),
            use_tls: false,
            ..DirectoryConfig::default()
        }
    }

    fn authenticator(dir: FakeDirectory) -> DirectoryAuthenticator {
        DirectoryAuthenticator::with_connector(&config(), Arc::new(dir))
    }

    #[tokio::test]
    async fn test_authenticates_with_two_binds() {
        let dir = FakeDirectory::new();
        let log = Arc::clone(&dir.log);
        let auth = authenticator(dir);

        let outcome = auth.authenticate("alice", "correct").await;

        assert_eq!(
            outcome,
            DirectoryOutcome::Authenticated {
                dn: ALICE_DN.to_string()
            }
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "connect".to_string(),
                format!("bind {SERVICE_DN}"),
                "search dc=example,dc=com (uid=alice)".to_string(),
                format!("bind {ALICE_DN}"),
                "unbind".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_wrong_password_denied() {
        let auth = authenticator(FakeDirectory::new());
        let outcome = auth.authenticate("alice", "wrongpass").await;
        assert!(matches!(
            outcome,
            DirectoryOutcome::Denied(DenyReason::UserBind(_))
        ));
        assert!(!outcome.is_authenticated());
    }

    #[tokio::test]
    async fn test_no_match_denied_regardless_of_password() {
        let auth = authenticator(FakeDirectory::new());
        for password in ["correct", "anything"] {
            assert_eq!(
                auth.authenticate("mallory", password).await,
                DirectoryOutcome::Denied(DenyReason::NoMatch)
            );
        }
    }

    #[tokio::test]
    async fn test_ambiguous_match_denied_regardless_of_password() {
        let mut dir = FakeDirectory::new();
        let other_dn = "uid=alice,ou=contractors,dc=example,dc=com";
        dir.entries.insert(
            "(uid=alice)".to_string(),
            vec![ALICE_DN.to_string(), other_dn.to_string()],
        );
        dir.passwords
            .insert(other_dn.to_string(), "correct".to_string());
        let log = Arc::clone(&dir.log);
        let auth = authenticator(dir);

        assert_eq!(
            auth.authenticate("alice", "correct").await,
            DirectoryOutcome::Denied(DenyReason::Ambiguous { count: 2 })
        );
        // Never attempts a user bind against a non-unique match
        let log = log.lock().unwrap();
        assert!(!log.iter().any(|l| l.contains("ou=people") || l.contains("ou=contractors")));
    }

    #[tokio::test]
    async fn test_service_bind_failure_denied() {
        let mut cfg = config();
        cfg.bind_password = "wrong".to_string();
        let dir = FakeDirectory::new();
        let log = Arc::clone(&dir.log);
        let auth = DirectoryAuthenticator::with_connector(&cfg, Arc::new(dir));

        let outcome = auth.authenticate("alice", "correct").await;

        assert!(matches!(
            outcome,
            DirectoryOutcome::Denied(DenyReason::ServiceBind(_))
        ));
        // Session is still closed
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("unbind"));
    }

    #[tokio::test]
    async fn test_anonymous_search_without_bind_dn() {
        let mut cfg = config();
        cfg.bind_dn = String::new();
        let dir = FakeDirectory::new();
        let log = Arc::clone(&dir.log);
        let auth = DirectoryAuthenticator::with_connector(&cfg, Arc::new(dir));

        assert!(auth.authenticate("alice", "correct").await.is_authenticated());
        assert!(!log.lock().unwrap().contains(&format!("bind {SERVICE_DN}")));
    }

    #[tokio::test]
    async fn test_unreachable_server_denied() {
        let dir = FakeDirectory {
            unreachable: true,
            ..FakeDirectory::new()
        };
        let auth = authenticator(dir);
        assert!(matches!(
            auth.authenticate("alice", "correct").await,
            DirectoryOutcome::Denied(DenyReason::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_search_failure_denied() {
        let dir = FakeDirectory {
            search_error: true,
            ..FakeDirectory::new()
        };
        let auth = authenticator(dir);
        assert!(matches!(
            auth.authenticate("alice", "correct").await,
            DirectoryOutcome::Denied(DenyReason::Search(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_password_denied_without_connecting() {
        let dir = FakeDirectory::new();
        let log = Arc::clone(&dir.log);
        let auth = authenticator(dir);

        assert_eq!(
            auth.authenticate("alice", "").await,
            DirectoryOutcome::Denied(DenyReason::EmptyPassword)
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_filter_escapes_username() {
        let auth = authenticator(FakeDirectory::new());
        assert_eq!(auth.filter_for("alice"), "(uid=alice)");
        assert_eq!(
            auth.filter_for("*)(uid=*").to_lowercase(),
            "(uid=\\2a\\29\\28uid=\\2a)"
        );
    }

    #[test]
    fn test_filter_substitutes_every_placeholder() {
        let mut config = config();
        config.filter = "(|(uid=%s)(mail=%s))".to_string();
        let auth = DirectoryAuthenticator::with_connector(&config, Arc::new(FakeDirectory::new()));

        assert_eq!(auth.filter_for("alice"), "(|(uid=alice)(mail=alice))");
        assert!(!auth.filter_for("a*").contains("%s"));
    }

    // Ldap3Connector against real sockets

    /// Listener that accepts connections and never answers
    async fn silent_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (addr, handle)
    }

    fn ldap3_config(server: String, use_tls: bool) -> DirectoryConfig {
        DirectoryConfig {
            server,
            use_tls,
            timeout: Duration::from_millis(300),
            ..config()
        }
    }

    async fn authenticate_bounded(config: &DirectoryConfig) -> DirectoryOutcome {
        let auth = DirectoryAuthenticator::from_config(config);
        tokio::time::timeout(Duration::from_secs(5), auth.authenticate("alice", "correct"))
            .await
            .expect("directory timeout was not applied")
    }

    #[tokio::test]
    async fn test_ldap3_silent_server_times_out() {
        let (addr, server) = silent_server().await;

        let outcome = authenticate_bounded(&ldap3_config(addr.to_string(), false)).await;
        assert!(
            matches!(
                outcome,
                DirectoryOutcome::Denied(DenyReason::Connect(_) | DenyReason::ServiceBind(_))
            ),
            "unexpected outcome: {outcome:?}"
        );

        server.abort();
    }

    #[tokio::test]
    async fn test_ldaps_silent_server_times_out() {
        let (addr, server) = silent_server().await;

        let outcome = authenticate_bounded(&ldap3_config(addr.to_string(), true)).await;
        assert!(
            matches!(
                outcome,
                DirectoryOutcome::Denied(DenyReason::Connect(_) | DenyReason::ServiceBind(_))
            ),
            "unexpected outcome: {outcome:?}"
        );

        server.abort();
    }

    #[tokio::test]
    async fn test_ldap3_refused_connection() {
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let outcome = authenticate_bounded(&ldap3_config(addr.to_string(), false)).await;
        assert!(
            matches!(outcome, DirectoryOutcome::Denied(DenyReason::Connect(_))),
            "unexpected outcome: {outcome:?}"
        );
    }

    #[test]
    fn test_deny_reason_display() {
        assert_eq!(
            DenyReason::Ambiguous { count: 3 }.to_string(),
            "3 entries matched, expected exactly one"
        );
        assert_eq!(DenyReason::NoMatch.to_string(), "no entry matched");
    }
}
