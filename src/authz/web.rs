//! Route-level authorization filter and the terminal 401/403 responses.
//!
//! The filter runs before dispatch. Clients are expected to send credentials
//! with every request, so no session or cookie is created on success and no
//! CSRF token is expected.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::authn::Resolver;
use crate::authz::engine;
use crate::authz::types::{normalize_path, AuthorizationContext, Decision, Operation};
use crate::authz::AuthzState;

pub const BASIC_CHALLENGE: &str = "Basic realm=\"warden\"";

#[derive(Clone)]
pub struct FilterState {
    pub authz: Arc<AuthzState>,
    pub resolver: Resolver,
}

/// JSON error body shared by every terminal error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

pub fn error_response(status: StatusCode, message: &str, path: &str) -> Response {
    let body = ErrorBody {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        status: status.as_u16(),
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        message: message.to_string(),
        path: path.to_string(),
    };
    (status, Json(body)).into_response()
}

/// Authorization failure rendered as 401 or 403. Carries only the request
/// path, never anything about the targeted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    Unauthenticated { path: String },
    Forbidden { path: String },
}

impl AccessDenied {
    pub fn from_decision(decision: Decision, path: &str) -> Option<Self> {
        match decision {
            Decision::Permit => None,
            Decision::Deny => Some(Self::Forbidden {
                path: path.to_string(),
            }),
            Decision::Unauthenticated => Some(Self::Unauthenticated {
                path: path.to_string(),
            }),
        }
    }
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        match self {
            AccessDenied::Unauthenticated { path } => {
                let mut resp = error_response(
                    StatusCode::UNAUTHORIZED,
                    "Full authentication is required to access this resource",
                    &path,
                );
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(BASIC_CHALLENGE),
                );
                resp
            }
            AccessDenied::Forbidden { path } => {
                error_response(StatusCode::FORBIDDEN, "Access is denied", &path)
            }
        }
    }
}

/// Resolve the caller, check route rules, and either abort with 401/403 or
/// continue with the resolved [`crate::authn::Authentication`] stored in the
/// request extensions for the method layer.
pub async fn route_filter(
    State(state): State<FilterState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credentials = request.headers().get(header::AUTHORIZATION).cloned();
    let auth = state.resolver.resolve(credentials.as_ref()).await;

    let method = request.method().clone();
    let path = normalize_path(request.uri().path());
    let rules = state.authz.table.rules_for_route(&method, &path);
    let ctx = AuthorizationContext::new(
        auth.principal(),
        Operation::Route {
            method,
            path: path.clone(),
        },
    );

    let decision = engine::decide(&ctx, &rules);
    if let Some(denied) = AccessDenied::from_decision(decision, request.uri().path()) {
        tracing::info!(path = %path, decision = ?decision, "request rejected at route layer");
        return denied.into_response();
    }

    request.extensions_mut().insert(auth);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_unauthenticated_sends_basic_challenge() {
        let resp = AccessDenied::Unauthenticated { path: "/x".into() }.into_response();
        let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert_eq!(challenge.to_str().unwrap(), BASIC_CHALLENGE);
    }

    #[tokio::test]
    async fn test_unauthenticated_body() {
        let resp = AccessDenied::Unauthenticated {
            path: "/employees".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(
            body["message"],
            "Full authentication is required to access this resource"
        );
        assert_eq!(body["path"], "/employees");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_forbidden_body() {
        let resp = AccessDenied::Forbidden {
            path: "/items/1".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
        let body = body_json(resp).await;
        assert_eq!(body["status"], 403);
        assert_eq!(body["error"], "Forbidden");
        assert_eq!(body["message"], "Access is denied");
        assert_eq!(body["path"], "/items/1");
        assert_eq!(body.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_permit_is_not_an_error() {
        assert!(AccessDenied::from_decision(Decision::Permit, "/").is_none());
    }
}
