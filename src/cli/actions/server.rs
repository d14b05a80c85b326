use crate::api::{
    self,
    handlers::{
        auth::{AuthConfig, AuthState},
        RenderPolling, Upstreams,
    },
};
use crate::cli::commands::upstream::{self, ServiceOptions};
use crate::stores::{PkceStore, VerificationCodeStore};
use crate::upstream::{
    address::AddressClient, backend::BackendClient, content::ContentClient, email::EmailClient,
    fulfillment::FulfillmentClient, payments::PaymentsClient, renderer::RendererClient, Endpoint,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub frontend_base_url: String,
    pub verification_code_ttl_seconds: u64,
    pub store_cleanup_seconds: u64,
    pub upstream: upstream::Options,
}

fn endpoint(service: &'static str, options: ServiceOptions) -> Result<Endpoint> {
    Endpoint::new(service, &options.url, options.api_key)
        .with_context(|| format!("Invalid {service} configuration"))
}

/// Build a client for every collaborator from the CLI options.
///
/// # Errors
/// Returns an error if an endpoint URL is invalid or an HTTP client cannot be built
pub fn upstreams(options: upstream::Options) -> Result<Upstreams> {
    let timeout = Duration::from_secs(options.timeout_seconds);

    Ok(Upstreams {
        backend: BackendClient::new(
            endpoint("backend", options.backend)?,
            options.backend_service_key,
            timeout,
        )?,
        payments: PaymentsClient::new(
            endpoint("payments", options.payments)?,
            options.payments_webhook_secret,
            timeout,
        )?,
        email: EmailClient::new(endpoint("email", options.email)?, &options.email_from, timeout)?,
        renderer: RendererClient::new(endpoint("renderer", options.renderer)?, timeout)?,
        address: AddressClient::new(endpoint("address", options.address)?, timeout)?,
        content: ContentClient::new(
            endpoint("content", options.content)?,
            &options.content_text_model,
            &options.content_image_model,
            timeout,
        )?,
        fulfillment: FulfillmentClient::new(endpoint("fulfillment", options.fulfillment)?, timeout)?,
        render_polling: RenderPolling::default(),
    })
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails
pub async fn execute(args: Args) -> Result<()> {
    debug!("server args: {args:?}");

    let upstreams = Arc::new(upstreams(args.upstream)?);

    let config = AuthConfig::new(args.frontend_base_url)
        .with_verification_code_ttl_seconds(args.verification_code_ttl_seconds);
    let auth_state = Arc::new(AuthState::new(
        config,
        Arc::new(VerificationCodeStore::new()),
        Arc::new(PkceStore::new()),
    ));

    api::new(
        args.port,
        auth_state,
        upstreams,
        Duration::from_secs(args.store_cleanup_seconds),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn service(url: &str) -> ServiceOptions {
        ServiceOptions {
            url: url.to_string(),
            api_key: SecretString::from("key".to_string()),
        }
    }

    fn options(backend_url: &str) -> upstream::Options {
        upstream::Options {
            timeout_seconds: 5,
            backend: service(backend_url),
            backend_service_key: SecretString::from("service".to_string()),
            payments: service("https://api.stripe.com"),
            payments_webhook_secret: SecretString::from("whsec".to_string()),
            email: service("https://api.resend.com"),
            email_from: "Hearts <hello@hearts.cards>".to_string(),
            renderer: service("https://api.bannerbear.com"),
            address: service("https://api.lob.com"),
            content: service("https://api.openai.com"),
            content_text_model: "gpt-4o-mini".to_string(),
            content_image_model: "dall-e-3".to_string(),
            fulfillment: service("https://print.example.com"),
        }
    }

    #[test]
    fn builds_all_clients() {
        let upstreams = upstreams(options("https://project.backend.test"));
        assert!(upstreams.is_ok());
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let err = upstreams(options("ftp://project.backend.test"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("backend"), "{err}");
    }
}
