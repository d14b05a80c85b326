//! The authenticated user and their `profiles` row.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::require_auth;
use super::{upstream_error_response, Upstreams};
use crate::upstream::{
    backend::{BackendAuth, BackendClient},
    UpstreamError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: Option<String>,
    /// `None` until the profile row exists.
    pub profile: Option<Value>,
}

/// Read a user's profile row with the service role.
pub(crate) async fn fetch_profile(
    backend: &BackendClient,
    user_id: Uuid,
) -> Result<Option<Value>, UpstreamError> {
    let rows = backend
        .select(
            "profiles",
            BackendAuth::Service,
            &[("id", user_id.to_string())],
        )
        .await?;
    Ok(rows.into_iter().next())
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user and profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid access token."),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, upstreams: Extension<Arc<Upstreams>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match fetch_profile(&upstreams.backend, principal.user_id).await {
        Ok(profile) => (
            StatusCode::OK,
            Json(MeResponse {
                id: principal.user_id.to_string(),
                email: principal.email,
                profile,
            }),
        )
            .into_response(),
        Err(err) => upstream_error_response("fetch profile", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::tests::offline_upstreams;

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let response = get_me(HeaderMap::new(), Extension(offline_upstreams()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
