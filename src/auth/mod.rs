//! Credential verification
//!
//! ```text
//! request
//!   -> credential      (bearer token body | Basic header)
//!   -> environment     (location hint -> identity provider settings)
//!   -> introspect      (remote token check)   | directory (LDAP bind/search/bind)
//!   -> gate            (allow | deny + status)
//! ```
//!
//! Verification is one-shot per request and fails closed: any error along
//! the way ends in a deny.

pub mod credential;
pub mod directory;
pub mod environment;
pub mod gate;
pub mod introspect;
pub mod token;

pub use credential::{BasicCredentials, CredentialError, IntrospectRequest};
pub use directory::{
    DenyReason, DirectoryAuthenticator, DirectoryConnector, DirectoryEntry, DirectoryError,
    DirectoryOutcome, DirectorySession, Ldap3Connector,
};
pub use environment::{Environment, EnvironmentConfig, EnvironmentResolver, PRODUCTION_LOCATION};
pub use gate::{AuthzDecision, BASIC_CHALLENGE};
pub use introspect::{IntrospectError, IntrospectionClient, IntrospectionVerdict};
pub use token::TokenVerifier;
