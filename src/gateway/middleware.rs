//! Verification middleware
//!
//! Two layers gate the routes behind them:
//! - [`token_middleware`]: introspects the bearer token carried in the JSON body
//! - [`directory_middleware`]: verifies an `Authorization: Basic` header against LDAP
//!
//! On allow the request continues with the verified identity in its
//! extensions; on deny the chain stops here.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::{
    AuthzDecision, BasicCredentials, DirectoryAuthenticator, DirectoryOutcome, IntrospectRequest,
    TokenVerifier,
};

/// Largest introspection body the gateway will buffer
pub const MAX_INTROSPECT_BODY: usize = 64 * 1024;

/// Identity established by [`directory_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPrincipal {
    /// Username as presented by the client
    pub username: String,
    /// DN the user bound as
    pub dn: String,
}

/// Token verification middleware.
///
/// Buffers the body, introspects its token, and replays the body to the next
/// handler so it can read the same request.
pub async fn token_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let bytes = match to_bytes(body, MAX_INTROSPECT_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path, error = %e, "Unreadable request body");
            return invalid_request_response(StatusCode::FORBIDDEN);
        }
    };

    let credential = match IntrospectRequest::from_body(&bytes) {
        Ok(credential) => credential,
        Err(e) => {
            warn!(path = %path, error = %e, "Rejected token request");
            return invalid_request_response(
                AuthzDecision::from_token_credential_error(&e).status,
            );
        }
    };

    let result = verifier
        .verify(&credential.token, &credential.location)
        .await;
    let decision = AuthzDecision::from_introspection(&result);
    if !decision.allowed {
        warn!(path = %path, location = %credential.location, "Token denied");
        return decision.into_response();
    }

    debug!(path = %path, location = %credential.location, "Token verified");
    let mut request = Request::from_parts(parts, Body::from(bytes));
    if let Ok(verdict) = result {
        request.extensions_mut().insert(verdict);
    }
    next.run(request).await
}

/// Directory (LDAP) Basic-auth middleware
pub async fn directory_middleware(
    State(directory): State<Arc<DirectoryAuthenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let credentials = match BasicCredentials::from_headers(request.headers()) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!(path = %path, error = %e, "Rejected directory credential");
            return AuthzDecision::from_basic_credential_error(&e).into_response();
        }
    };

    debug!(path = %path, username = %credentials.username, "Directory authentication requested");
    let outcome = directory
        .authenticate(&credentials.username, &credentials.password)
        .await;

    let decision = AuthzDecision::from_directory_outcome(&outcome);
    match outcome {
        DirectoryOutcome::Authenticated { dn } => {
            request.extensions_mut().insert(DirectoryPrincipal {
                username: credentials.username,
                dn,
            });
            next.run(request).await
        }
        DirectoryOutcome::Denied(_) => decision.into_response(),
    }
}

/// `{"status": false, "message": "Invalid request"}` with the given status
pub fn invalid_request_response(status: StatusCode) -> Response {
    (
        status,
        Json(json!({
            "status": false,
            "message": "Invalid request"
        })),
    )
        .into_response()
}
