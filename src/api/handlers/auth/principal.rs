//! Resolve the bearer access token on a request into a user.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::api::handlers::upstream_error_response;
use crate::upstream::{backend::BackendClient, UpstreamError};

/// Authenticated user context for downstream handlers.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolve the access token through the backend, or answer 401.
pub async fn require_auth(headers: &HeaderMap, backend: &BackendClient) -> Result<Principal, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()).into_response());
    };

    match backend.get_user(token).await {
        Ok(user) => Ok(Principal {
            user_id: user.id,
            email: user.email,
            access_token: token.to_string(),
        }),
        Err(UpstreamError::Status { status, .. })
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
        {
            Err((StatusCode::UNAUTHORIZED, "Invalid or expired session".to_string()).into_response())
        }
        Err(err) => Err(upstream_error_response("resolve session", &err)),
    }
}
