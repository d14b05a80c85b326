use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use super::types::LoginRequest;
use crate::api::handlers::{missing_payload, upstream_error_response, valid_email, Upstreams};
use crate::stores::normalize_email;
use crate::upstream::backend::Session;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 400, description = "Invalid credentials or payload", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid credentials".to_string()).into_response();
    }

    match upstreams
        .backend
        .sign_in_with_password(&email, &request.password)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(err) => upstream_error_response("sign in", &err),
    }
}
