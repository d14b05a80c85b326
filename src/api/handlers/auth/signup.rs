//! Password signup backed by an emailed verification code.
//!
//! Flow Overview:
//! 1) Validate the payload and create the account in the backend.
//! 2) Create the `profiles` row with the service role.
//! 3) Issue a six digit code and email it. A failed send is reported in the
//!    response instead of failing the signup, the client can call resend.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::state::AuthState;
use super::types::{SignupRequest, SignupResponse};
use crate::api::handlers::{missing_payload, upstream_error_response, valid_email, Upstreams};
use crate::stores::normalize_email;
use crate::upstream::{backend::BackendAuth, email::EmailMessage};

pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

/// Issue a new code for `email` and mail it. Returns whether the provider
/// accepted the message.
pub(super) async fn send_verification_code(
    auth_state: &AuthState,
    upstreams: &Upstreams,
    email: &str,
) -> bool {
    let ttl = auth_state.config().verification_code_ttl();
    let code = auth_state.codes().issue(email, ttl).await;
    let message = EmailMessage::verification_code(email, &code, ttl);

    match upstreams.email.send(&message).await {
        Ok(_) => true,
        Err(err) => {
            error!("Failed to send verification email: {err}");
            false
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = SignupResponse),
        (status = 400, description = "Invalid email, password or name", body = String),
        (status = 422, description = "Rejected by the auth backend", body = String)
    ),
    tag = "auth"
)]
pub async fn signup(
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        return (
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        )
            .into_response();
    }

    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing name".to_string()).into_response();
    }

    let user = match upstreams
        .backend
        .sign_up(&email, &request.password, json!({ "full_name": full_name }))
        .await
    {
        Ok(user) => user,
        Err(err) => return upstream_error_response("sign up", &err),
    };

    let profile = json!({
        "id": user.id,
        "email": email,
        "full_name": full_name,
        "email_verified": false,
    });
    if let Err(err) = upstreams
        .backend
        .insert("profiles", BackendAuth::Service, &profile)
        .await
    {
        // the backend may already create profiles from a trigger
        warn!("Failed to create profile row: {err}");
    }

    let verification_sent = send_verification_code(&auth_state, &upstreams, &email).await;

    info!(user_id = %user.id, verification_sent, "account created");

    (
        StatusCode::CREATED,
        Json(SignupResponse {
            user_id: user.id.to_string(),
            email,
            verification_sent,
        }),
    )
        .into_response()
}
