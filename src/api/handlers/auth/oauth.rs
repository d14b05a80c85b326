//! Third-party sign-in through the backend's OAuth authorization-code flow
//! with PKCE.
//!
//! Flow Overview:
//! 1) `authorize` generates `state` and a verifier, stores them and returns
//!    the provider URL. The callback URL carries `state` back to us.
//! 2) `callback` redeems `state` exactly once and exchanges the code with the
//!    verifier for a session.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use super::state::AuthState;
use super::types::{AuthorizeQuery, AuthorizeResponse, CallbackQuery};
use crate::api::handlers::{upstream_error_response, Upstreams};
use crate::stores::{PkceChallenge, CODE_CHALLENGE_METHOD};
use crate::upstream::backend::Session;

fn valid_provider(provider: &str) -> bool {
    !provider.is_empty()
        && provider.len() <= 32
        && provider
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/authorize",
    params(AuthorizeQuery),
    responses(
        (status = 200, description = "Provider URL to redirect the browser to", body = AuthorizeResponse),
        (status = 400, description = "Unsupported provider", body = String)
    ),
    tag = "auth"
)]
pub async fn authorize(
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    Query(query): Query<AuthorizeQuery>,
) -> impl IntoResponse {
    let provider = query.provider.trim().to_lowercase();
    if !valid_provider(&provider) {
        return (StatusCode::BAD_REQUEST, "Unsupported provider".to_string()).into_response();
    }

    let challenge = match PkceChallenge::generate() {
        Ok(challenge) => challenge,
        Err(err) => {
            error!("Failed to generate PKCE material: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start sign-in".to_string(),
            )
                .into_response();
        }
    };

    let redirect_to = match Url::parse_with_params(
        &auth_state.config().oauth_redirect_url(),
        &[("state", challenge.state.as_str())],
    ) {
        Ok(url) => url,
        Err(err) => {
            error!("Invalid OAuth redirect URL: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service misconfigured".to_string(),
            )
                .into_response();
        }
    };

    let url = match upstreams.backend.authorize_url(
        &provider,
        redirect_to.as_str(),
        &challenge.code_challenge,
        CODE_CHALLENGE_METHOD,
    ) {
        Ok(url) => url,
        Err(err) => return upstream_error_response("build authorize URL", &err),
    };

    auth_state
        .pkce()
        .store(&challenge.state, &challenge.code_verifier)
        .await;

    debug!(provider = %provider, "OAuth flow started");

    (
        StatusCode::OK,
        Json(AuthorizeResponse {
            url: url.to_string(),
            state: challenge.state,
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/callback",
    params(CallbackQuery),
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 400, description = "Invalid or expired OAuth state", body = String)
    ),
    tag = "auth"
)]
pub async fn callback(
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    let Some(code_verifier) = auth_state.pkce().retrieve(&query.state).await else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid or expired OAuth state".to_string(),
        )
            .into_response();
    };

    match upstreams
        .backend
        .exchange_code_for_session(&query.code, &code_verifier)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(err) => upstream_error_response("exchange OAuth code", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::AuthConfig;
    use crate::api::handlers::tests::{offline_upstreams, test_auth_state};
    use anyhow::{Context, Result};
    use axum::body::to_bytes;

    #[test]
    fn provider_names() {
        assert!(valid_provider("google"));
        assert!(valid_provider("azure-ad"));
        assert!(!valid_provider(""));
        assert!(!valid_provider("goo gle"));
        assert!(!valid_provider("evil&redirect_to=x"));
    }

    #[tokio::test]
    async fn authorize_stores_state_and_builds_url() -> Result<()> {
        let auth_state = test_auth_state(AuthConfig::new("https://hearts.cards".to_string()));
        let response = authorize(
            Extension(auth_state.clone()),
            Extension(offline_upstreams()),
            Query(AuthorizeQuery {
                provider: "Google".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body: AuthorizeResponse = serde_json::from_slice(&body)?;
        let url = Url::parse(&body.url)?;
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(query.get("provider").map(String::as_str), Some("google"));
        assert_eq!(
            query.get("code_challenge_method").map(String::as_str),
            Some("s256")
        );
        let redirect = Url::parse(query.get("redirect_to").context("missing redirect_to")?)?;
        assert_eq!(redirect.path(), "/auth/callback");
        assert!(redirect
            .query_pairs()
            .any(|(k, v)| k == "state" && v == body.state.as_str()));
        assert_eq!(auth_state.pkce().len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn callback_with_unknown_state_is_rejected() -> Result<()> {
        let auth_state = test_auth_state(AuthConfig::new("https://hearts.cards".to_string()));
        let response = callback(
            Extension(auth_state),
            Extension(offline_upstreams()),
            Query(CallbackQuery {
                code: "code".to_string(),
                state: "never-issued".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"Invalid or expired OAuth state");
        Ok(())
    }
}
