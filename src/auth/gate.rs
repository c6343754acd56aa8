//! Allow/deny decision and its HTTP rendering.
//!
//! Every verification path ends here and every failure denies. The only
//! thing that crosses back to the router is an [`AuthzDecision`].

use axum::{
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};

use super::credential::CredentialError;
use super::directory::DirectoryOutcome;
use super::introspect::{IntrospectError, IntrospectionVerdict};

/// `WWW-Authenticate` challenge sent on the directory path
pub const BASIC_CHALLENGE: &str = "Basic realm=\"\"";

/// Outcome of the verification gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthzDecision {
    /// Whether the request may proceed to the next handler
    pub allowed: bool,
    /// Status to answer with
    pub status: StatusCode,
    /// Attach a Basic `WWW-Authenticate` challenge
    pub challenge: bool,
}

impl AuthzDecision {
    /// Let the request through
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            status: StatusCode::OK,
            challenge: false,
        }
    }

    fn deny(status: StatusCode, challenge: bool) -> Self {
        Self {
            allowed: false,
            status,
            challenge,
        }
    }

    /// Token path: allowed iff the verdict is active
    #[must_use]
    pub fn from_verdict(verdict: &IntrospectionVerdict) -> Self {
        if verdict.active {
            Self::allow()
        } else {
            Self::deny(StatusCode::FORBIDDEN, false)
        }
    }

    /// Token path including upstream failures, which deny
    #[must_use]
    pub fn from_introspection(result: &Result<IntrospectionVerdict, IntrospectError>) -> Self {
        match result {
            Ok(verdict) => Self::from_verdict(verdict),
            Err(_) => Self::deny(StatusCode::FORBIDDEN, false),
        }
    }

    /// Token path: the request body did not carry a usable credential
    #[must_use]
    pub fn from_token_credential_error(_err: &CredentialError) -> Self {
        Self::deny(StatusCode::FORBIDDEN, false)
    }

    /// Directory path: allowed iff the user bind succeeded
    #[must_use]
    pub fn from_directory(authenticated: bool) -> Self {
        if authenticated {
            Self::allow()
        } else {
            Self::deny(StatusCode::FORBIDDEN, true)
        }
    }

    /// Directory path from the tagged outcome
    #[must_use]
    pub fn from_directory_outcome(outcome: &DirectoryOutcome) -> Self {
        Self::from_directory(outcome.is_authenticated())
    }

    /// Directory path: missing header challenges with 401, malformed denies with 403
    #[must_use]
    pub fn from_basic_credential_error(err: &CredentialError) -> Self {
        match err {
            CredentialError::Missing => Self::deny(StatusCode::UNAUTHORIZED, true),
            CredentialError::Malformed(_) => Self::deny(StatusCode::FORBIDDEN, true),
        }
    }
}

impl IntoResponse for AuthzDecision {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        if self.challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::DenyReason;

    #[test]
    fn test_active_verdict_allows() {
        let verdict = IntrospectionVerdict {
            active: true,
            ..IntrospectionVerdict::default()
        };
        assert_eq!(AuthzDecision::from_verdict(&verdict), AuthzDecision::allow());
    }

    #[test]
    fn test_inactive_verdict_denies() {
        let decision = AuthzDecision::from_verdict(&IntrospectionVerdict::inactive());
        assert!(!decision.allowed);
        assert_eq!(decision.status, StatusCode::FORBIDDEN);
        assert!(!decision.challenge);
    }

    #[test]
    fn test_upstream_failures_deny() {
        for err in [
            IntrospectError::UpstreamUnreachable("connection refused".to_string()),
            IntrospectError::UpstreamError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            },
            IntrospectError::InvalidUpstreamResponse("eof".to_string()),
        ] {
            let decision = AuthzDecision::from_introspection(&Err(err));
            assert!(!decision.allowed);
            assert_eq!(decision.status, StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_directory_decisions() {
        assert!(AuthzDecision::from_directory(true).allowed);

        let denied = AuthzDecision::from_directory_outcome(&DirectoryOutcome::Denied(
            DenyReason::Ambiguous { count: 2 },
        ));
        assert!(!denied.allowed);
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert!(denied.challenge);
    }

    #[test]
    fn test_basic_credential_errors() {
        let missing = AuthzDecision::from_basic_credential_error(&CredentialError::Missing);
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        assert!(missing.challenge);

        let malformed = AuthzDecision::from_basic_credential_error(&CredentialError::Malformed(
            "invalid base64".to_string(),
        ));
        assert_eq!(malformed.status, StatusCode::FORBIDDEN);
        assert!(malformed.challenge);
    }

    #[test]
    fn test_challenge_header_rendered() {
        let response = AuthzDecision::from_directory(false).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"\""
        );

        let response = AuthzDecision::from_verdict(&IntrospectionVerdict::inactive()).into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
