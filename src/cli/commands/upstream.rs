//! Base URLs and credentials for the external collaborators.

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_UPSTREAM_TIMEOUT_SECONDS: &str = "upstream-timeout-seconds";

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_BACKEND_ANON_KEY: &str = "backend-anon-key";
pub const ARG_BACKEND_SERVICE_KEY: &str = "backend-service-key";

pub const ARG_PAYMENTS_URL: &str = "payments-url";
pub const ARG_PAYMENTS_SECRET_KEY: &str = "payments-secret-key";
pub const ARG_PAYMENTS_WEBHOOK_SECRET: &str = "payments-webhook-secret";

pub const ARG_EMAIL_URL: &str = "email-url";
pub const ARG_EMAIL_API_KEY: &str = "email-api-key";
pub const ARG_EMAIL_FROM: &str = "email-from";

pub const ARG_RENDERER_URL: &str = "renderer-url";
pub const ARG_RENDERER_API_KEY: &str = "renderer-api-key";

pub const ARG_ADDRESS_URL: &str = "address-url";
pub const ARG_ADDRESS_API_KEY: &str = "address-api-key";

pub const ARG_CONTENT_URL: &str = "content-url";
pub const ARG_CONTENT_API_KEY: &str = "content-api-key";
pub const ARG_CONTENT_TEXT_MODEL: &str = "content-text-model";
pub const ARG_CONTENT_IMAGE_MODEL: &str = "content-image-model";

pub const ARG_FULFILLMENT_URL: &str = "fulfillment-url";
pub const ARG_FULFILLMENT_API_KEY: &str = "fulfillment-api-key";

/// URL and key for one collaborator.
#[derive(Clone)]
pub struct ServiceOptions {
    pub url: String,
    pub api_key: SecretString,
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("url", &self.url)
            .field("api_key", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct Options {
    pub timeout_seconds: u64,
    pub backend: ServiceOptions,
    pub backend_service_key: SecretString,
    pub payments: ServiceOptions,
    pub payments_webhook_secret: SecretString,
    pub email: ServiceOptions,
    pub email_from: String,
    pub renderer: ServiceOptions,
    pub address: ServiceOptions,
    pub content: ServiceOptions,
    pub content_text_model: String,
    pub content_image_model: String,
    pub fulfillment: ServiceOptions,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("backend", &self.backend)
            .field("backend_service_key", &"***")
            .field("payments", &self.payments)
            .field("payments_webhook_secret", &"***")
            .field("email", &self.email)
            .field("email_from", &self.email_from)
            .field("renderer", &self.renderer)
            .field("address", &self.address)
            .field("content", &self.content)
            .field("content_text_model", &self.content_text_model)
            .field("content_image_model", &self.content_image_model)
            .field("fulfillment", &self.fulfillment)
            .finish()
    }
}

fn required(matches: &ArgMatches, id: &str) -> anyhow::Result<String> {
    match matches.get_one::<String>(id) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => anyhow::bail!("missing required argument: --{id}"),
    }
}

fn secret(matches: &ArgMatches, id: &str) -> anyhow::Result<SecretString> {
    required(matches, id).map(SecretString::from)
}

fn service(matches: &ArgMatches, url: &str, key: &str) -> anyhow::Result<ServiceOptions> {
    Ok(ServiceOptions {
        url: required(matches, url)?,
        api_key: secret(matches, key)?,
    })
}

impl Options {
    /// Parse collaborator arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a URL or credential is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            timeout_seconds: matches
                .get_one::<u64>(ARG_UPSTREAM_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(15),
            backend: service(matches, ARG_BACKEND_URL, ARG_BACKEND_ANON_KEY)?,
            backend_service_key: secret(matches, ARG_BACKEND_SERVICE_KEY)?,
            payments: service(matches, ARG_PAYMENTS_URL, ARG_PAYMENTS_SECRET_KEY)?,
            payments_webhook_secret: secret(matches, ARG_PAYMENTS_WEBHOOK_SECRET)?,
            email: service(matches, ARG_EMAIL_URL, ARG_EMAIL_API_KEY)?,
            email_from: required(matches, ARG_EMAIL_FROM)?,
            renderer: service(matches, ARG_RENDERER_URL, ARG_RENDERER_API_KEY)?,
            address: service(matches, ARG_ADDRESS_URL, ARG_ADDRESS_API_KEY)?,
            content: service(matches, ARG_CONTENT_URL, ARG_CONTENT_API_KEY)?,
            content_text_model: required(matches, ARG_CONTENT_TEXT_MODEL)?,
            content_image_model: required(matches, ARG_CONTENT_IMAGE_MODEL)?,
            fulfillment: service(matches, ARG_FULFILLMENT_URL, ARG_FULFILLMENT_API_KEY)?,
        })
    }
}

fn url_arg(id: &'static str, help: &'static str, env: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).env(env)
}

fn key_arg(id: &'static str, help: &'static str, env: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).env(env).hide_env_values(true)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command.arg(
        Arg::new(ARG_UPSTREAM_TIMEOUT_SECONDS)
            .long(ARG_UPSTREAM_TIMEOUT_SECONDS)
            .help("Request timeout for collaborator calls in seconds")
            .env("HEARTS_UPSTREAM_TIMEOUT_SECONDS")
            .default_value("15")
            .value_parser(clap::value_parser!(u64)),
    );

    let command = with_backend_args(command);
    let command = with_payments_args(command);
    let command = with_email_args(command);
    let command = with_content_args(command);
    with_print_args(command)
}

fn with_backend_args(command: Command) -> Command {
    command
        .arg(url_arg(
            ARG_BACKEND_URL,
            "Auth and database backend base URL",
            "HEARTS_BACKEND_URL",
        ))
        .arg(key_arg(
            ARG_BACKEND_ANON_KEY,
            "Backend anonymous (public) key",
            "HEARTS_BACKEND_ANON_KEY",
        ))
        .arg(key_arg(
            ARG_BACKEND_SERVICE_KEY,
            "Backend service-role key",
            "HEARTS_BACKEND_SERVICE_KEY",
        ))
}

fn with_payments_args(command: Command) -> Command {
    command
        .arg(
            url_arg(
                ARG_PAYMENTS_URL,
                "Payment processor base URL",
                "HEARTS_PAYMENTS_URL",
            )
            .default_value("https://api.stripe.com"),
        )
        .arg(key_arg(
            ARG_PAYMENTS_SECRET_KEY,
            "Payment processor secret key",
            "HEARTS_PAYMENTS_SECRET_KEY",
        ))
        .arg(key_arg(
            ARG_PAYMENTS_WEBHOOK_SECRET,
            "Signing secret for payment webhooks",
            "HEARTS_PAYMENTS_WEBHOOK_SECRET",
        ))
}

fn with_email_args(command: Command) -> Command {
    command
        .arg(
            url_arg(ARG_EMAIL_URL, "Email provider base URL", "HEARTS_EMAIL_URL")
                .default_value("https://api.resend.com"),
        )
        .arg(key_arg(
            ARG_EMAIL_API_KEY,
            "Email provider API key",
            "HEARTS_EMAIL_API_KEY",
        ))
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender for outgoing email")
                .env("HEARTS_EMAIL_FROM")
                .default_value("Hearts <hello@hearts.cards>"),
        )
}

fn with_content_args(command: Command) -> Command {
    command
        .arg(
            url_arg(
                ARG_RENDERER_URL,
                "Card renderer base URL",
                "HEARTS_RENDERER_URL",
            )
            .default_value("https://api.bannerbear.com"),
        )
        .arg(key_arg(
            ARG_RENDERER_API_KEY,
            "Card renderer API key",
            "HEARTS_RENDERER_API_KEY",
        ))
        .arg(
            url_arg(
                ARG_CONTENT_URL,
                "AI content provider base URL",
                "HEARTS_CONTENT_URL",
            )
            .default_value("https://api.openai.com"),
        )
        .arg(key_arg(
            ARG_CONTENT_API_KEY,
            "AI content provider API key",
            "HEARTS_CONTENT_API_KEY",
        ))
        .arg(
            Arg::new(ARG_CONTENT_TEXT_MODEL)
                .long(ARG_CONTENT_TEXT_MODEL)
                .help("Model used for card messages")
                .env("HEARTS_CONTENT_TEXT_MODEL")
                .default_value("gpt-4o-mini"),
        )
        .arg(
            Arg::new(ARG_CONTENT_IMAGE_MODEL)
                .long(ARG_CONTENT_IMAGE_MODEL)
                .help("Model used for card images")
                .env("HEARTS_CONTENT_IMAGE_MODEL")
                .default_value("dall-e-3"),
        )
}

fn with_print_args(command: Command) -> Command {
    command
        .arg(
            url_arg(
                ARG_ADDRESS_URL,
                "Address validation base URL",
                "HEARTS_ADDRESS_URL",
            )
            .default_value("https://api.lob.com"),
        )
        .arg(key_arg(
            ARG_ADDRESS_API_KEY,
            "Address validation API key",
            "HEARTS_ADDRESS_API_KEY",
        ))
        .arg(url_arg(
            ARG_FULFILLMENT_URL,
            "Print-and-mail fulfillment base URL",
            "HEARTS_FULFILLMENT_URL",
        ))
        .arg(key_arg(
            ARG_FULFILLMENT_API_KEY,
            "Print-and-mail fulfillment API key",
            "HEARTS_FULFILLMENT_API_KEY",
        ))
}
