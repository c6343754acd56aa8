//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use super::middleware::{
    MAX_INTROSPECT_BODY, directory_middleware, invalid_request_response, token_middleware,
};
use crate::auth::{
    AuthzDecision, DirectoryAuthenticator, IntrospectRequest, IntrospectionVerdict, TokenVerifier,
};

/// Shared application state
pub struct AppState {
    /// Token verifier, present when introspection is enabled
    pub token_verifier: Option<Arc<TokenVerifier>>,
    /// Directory authenticator, present when the directory is enabled
    pub directory: Option<Arc<DirectoryAuthenticator>>,
    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,
}

/// Create the router
///
/// Routes are only mounted for the verification paths that are configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));

    if let Some(verifier) = &state.token_verifier {
        router = router
            .route("/okta/introspect", post(introspect_handler))
            // Everything under /auth is gated
            .route(
                "/auth/okta/introspect",
                post(introspect_handler).route_layer(middleware::from_fn_with_state(
                    Arc::clone(verifier),
                    token_middleware,
                )),
            );
    }

    if let Some(directory) = &state.directory {
        router = router.route(
            "/ldap/auth",
            any(directory_auth_handler).route_layer(middleware::from_fn_with_state(
                Arc::clone(directory),
                directory_middleware,
            )),
        );
    }

    let cors = cors_layer(&state.cors_origins);

    router
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for browser callers
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::HEAD,
            Method::OPTIONS,
            Method::DELETE,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Introspection report (POST /okta/introspect, POST /auth/okta/introspect)
///
/// Behind [`token_middleware`] the verdict is already in the request
/// extensions and is reported without a second upstream call.
async fn introspect_handler(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Response {
    if let Some(verdict) = request.extensions().get::<IntrospectionVerdict>() {
        return introspect_report(verdict);
    }

    let Some(verifier) = state.token_verifier.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let bytes = match to_bytes(request.into_body(), MAX_INTROSPECT_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Unreadable request body");
            return invalid_request_response(StatusCode::BAD_REQUEST);
        }
    };

    let credential = match IntrospectRequest::from_body(&bytes) {
        Ok(credential) => credential,
        Err(e) => {
            debug!(error = %e, "Invalid introspection request");
            return invalid_request_response(StatusCode::BAD_REQUEST);
        }
    };

    let result = verifier
        .verify(&credential.token, &credential.location)
        .await;
    match &result {
        Ok(verdict) => introspect_report(verdict),
        Err(_) => {
            let decision = AuthzDecision::from_introspection(&result);
            (
                decision.status,
                Json(json!({
                    "status": false,
                    "message": "Token verification unavailable"
                })),
            )
                .into_response()
        }
    }
}

fn introspect_report(verdict: &IntrospectionVerdict) -> Response {
    Json(json!({ "introspect": verdict })).into_response()
}

/// Directory auth endpoint (ANY /ldap/auth)
///
/// Reached only after [`directory_middleware`] allowed the request.
async fn directory_auth_handler() -> StatusCode {
    StatusCode::OK
}
