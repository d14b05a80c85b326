//! Email verification code endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::signup::send_verification_code;
use super::state::AuthState;
use super::types::{ResendRequest, VerifyRequest};
use crate::api::handlers::{missing_payload, upstream_error_response, valid_email, Upstreams};
use crate::stores::normalize_email;
use crate::upstream::backend::BackendAuth;

/// Check the emailed code and mark the profile as verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired code", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let request: VerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = normalize_email(&request.email);
    if !auth_state.codes().verify(&email, request.code.trim()).await {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid or expired code".to_string(),
        )
            .into_response();
    }

    match upstreams
        .backend
        .update(
            "profiles",
            BackendAuth::Service,
            &[("email", email.clone())],
            &json!({ "email_verified": true }),
        )
        .await
    {
        Ok(_) => {
            info!(email = %email, "email verified");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => upstream_error_response("mark email verified", &err),
    }
}

/// Send a fresh code (always returns 204 to avoid account probing).
#[utoipa::path(
    post,
    path = "/v1/auth/resend",
    request_body = ResendRequest,
    responses(
        (status = 204, description = "Resend accepted")
    ),
    tag = "auth"
)]
pub async fn resend(
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<ResendRequest>>,
) -> impl IntoResponse {
    let request: ResendRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = normalize_email(&request.email);
    if valid_email(&email) {
        send_verification_code(&auth_state, &upstreams, &email).await;
    }

    StatusCode::NO_CONTENT.into_response()
}
