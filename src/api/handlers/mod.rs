pub mod addresses;
pub mod auth;
pub mod billing;
pub mod cards;
pub mod health;
pub mod hearts;
pub mod me;
pub mod orders;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error};

use crate::upstream::{
    address::AddressClient, backend::BackendClient, content::ContentClient, email::EmailClient,
    fulfillment::FulfillmentClient, payments::PaymentsClient, renderer::RendererClient,
    UpstreamError,
};

/// How long `wait=true` render requests keep polling.
#[derive(Clone, Copy, Debug)]
pub struct RenderPolling {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RenderPolling {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_secs(1),
        }
    }
}

/// Clients for every external collaborator, shared by all handlers.
#[derive(Clone, Debug)]
pub struct Upstreams {
    pub backend: BackendClient,
    pub payments: PaymentsClient,
    pub email: EmailClient,
    pub renderer: RendererClient,
    pub address: AddressClient,
    pub content: ContentClient,
    pub fulfillment: FulfillmentClient,
    pub render_polling: RenderPolling,
}

static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

pub(crate) fn missing_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
}

/// Turn a collaborator failure into our response: client errors pass
/// through with their message, everything else is logged and hidden.
pub(crate) fn upstream_error_response(action: &str, err: &UpstreamError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!("Failed to {action}: {err}");
    } else {
        debug!("{action} rejected: {err}");
    }
    (status, err.public_message()).into_response()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::handlers::auth::{AuthConfig, AuthState};
    use crate::stores::{PkceStore, VerificationCodeStore};
    use crate::upstream::Endpoint;
    use axum::http::StatusCode;
    use secrecy::SecretString;
    use std::sync::Arc;

    /// Clients pointed at a closed local port, for paths that must fail
    /// before any collaborator is called.
    pub(crate) fn offline_upstreams() -> Arc<Upstreams> {
        Arc::new(upstreams_at("http://127.0.0.1:9").expect("offline upstreams"))
    }

    /// Every collaborator served from `base`, as a mock server does.
    pub(crate) fn upstreams_at(base: &str) -> anyhow::Result<Upstreams> {
        let timeout = Duration::from_secs(5);
        let endpoint = |service: &'static str| {
            Endpoint::new(service, base, SecretString::from(format!("{service}-key")))
        };
        Ok(Upstreams {
            backend: BackendClient::new(
                endpoint("backend")?,
                SecretString::from("service-key".to_string()),
                timeout,
            )?,
            payments: PaymentsClient::new(
                endpoint("payments")?,
                SecretString::from("whsec_test".to_string()),
                timeout,
            )?,
            email: EmailClient::new(endpoint("email")?, "Hearts <hello@hearts.cards>", timeout)?,
            renderer: RendererClient::new(endpoint("renderer")?, timeout)?,
            address: AddressClient::new(endpoint("address")?, timeout)?,
            content: ContentClient::new(endpoint("content")?, "gpt-4o-mini", "dall-e-3", timeout)?,
            fulfillment: FulfillmentClient::new(endpoint("fulfillment")?, timeout)?,
            render_polling: RenderPolling {
                attempts: 3,
                interval: Duration::from_millis(5),
            },
        })
    }

    pub(crate) fn test_auth_state(config: AuthConfig) -> Arc<AuthState> {
        Arc::new(AuthState::new(
            config,
            Arc::new(VerificationCodeStore::new()),
            Arc::new(PkceStore::new()),
        ))
    }

    #[test]
    fn test_valid_email() {
        assert!(valid_email("ana@hearts.cards"));
        assert!(valid_email("a.b+c@sub.example.co"));
        assert!(!valid_email("ana"));
        assert!(!valid_email("ana@localhost"));
        assert!(!valid_email("ana @hearts.cards"));
        assert!(!valid_email(""));
    }

    #[test]
    fn upstream_client_errors_pass_through() {
        let err = UpstreamError::Status {
            service: "backend",
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "User already registered".to_string(),
        };
        let response = upstream_error_response("sign up", &err);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn upstream_server_errors_are_hidden() {
        let err = UpstreamError::Status {
            service: "backend",
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "db down".to_string(),
        };
        let response = upstream_error_response("sign up", &err);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
