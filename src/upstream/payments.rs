//! Payment processor (Stripe-style form-encoded API) and its webhooks.

use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::instrument;
use url::Url;
use utoipa::ToSchema;

use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "payments";

/// Accept webhook timestamps up to five minutes old.
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    /// Present when the first invoice needs client-side confirmation.
    pub client_secret: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct PaymentMethod {
    pub id: String,
    pub card: Option<CardDetails>,
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct PortalSession {
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebhookEventData {
    pub object: Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("timestamp outside the tolerance window")]
    Stale,
    #[error("no signature matches the payload")]
    Mismatch,
    #[error("invalid event payload: {0}")]
    Payload(String),
}

#[derive(Clone)]
pub struct PaymentsClient {
    client: Client,
    endpoint: Endpoint,
    webhook_secret: SecretString,
}

impl std::fmt::Debug for PaymentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsClient")
            .field("endpoint", &self.endpoint)
            .field("webhook_secret", &"***")
            .finish()
    }
}

impl PaymentsClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Endpoint,
        webhook_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
            webhook_secret,
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .form(form)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    /// Create a customer tagged with our user id.
    #[instrument(skip(self))]
    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        user_id: &str,
    ) -> Result<Customer, UpstreamError> {
        let mut form = vec![("email", email), ("metadata[user_id]", user_id)];
        if let Some(name) = name {
            form.push(("name", name));
        }
        self.post_form(self.endpoint.url("/v1/customers")?, &form).await
    }

    /// Start a subscription; incomplete until the first invoice is paid.
    #[instrument(skip(self))]
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        payment_method_id: Option<&str>,
    ) -> Result<Subscription, UpstreamError> {
        let mut form = vec![
            ("customer", customer_id),
            ("items[0][price]", price_id),
            ("payment_behavior", "default_incomplete"),
            ("expand[0]", "latest_invoice.payment_intent"),
        ];
        if let Some(payment_method_id) = payment_method_id {
            form.push(("default_payment_method", payment_method_id));
        }

        let body: Value = self.post_form(self.endpoint.url("/v1/subscriptions")?, &form).await?;

        let id = body["id"]
            .as_str()
            .ok_or_else(|| UpstreamError::payload(SERVICE, "subscription without id"))?;
        let status = body["status"]
            .as_str()
            .ok_or_else(|| UpstreamError::payload(SERVICE, "subscription without status"))?;
        let client_secret = body["latest_invoice"]["payment_intent"]["client_secret"]
            .as_str()
            .map(ToString::to_string);

        Ok(Subscription {
            id: id.to_string(),
            status: status.to_string(),
            client_secret,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, UpstreamError> {
        let mut url =
            self.endpoint
                .url_segments(&["v1", "customers", customer_id, "payment_methods"])?;
        url.query_pairs_mut().append_pair("type", "card");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.endpoint.api_key())
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let list: List<PaymentMethod> = decode(SERVICE, response).await?;
        Ok(list.data)
    }

    #[instrument(skip(self))]
    pub async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, UpstreamError> {
        let url = self
            .endpoint
            .url_segments(&["v1", "payment_methods", payment_method_id, "detach"])?;
        self.post_form(url, &[]).await
    }

    #[instrument(skip(self))]
    pub async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, UpstreamError> {
        let url = self.endpoint.url_segments(&["v1", "customers", customer_id])?;
        self.post_form(
            url,
            &[(
                "invoice_settings[default_payment_method]",
                payment_method_id,
            )],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, UpstreamError> {
        self.post_form(
            self.endpoint.url("/v1/billing_portal/sessions")?,
            &[("customer", customer_id), ("return_url", return_url)],
        )
        .await
    }

    /// Authenticate and parse a webhook delivery.
    ///
    /// # Errors
    /// Returns an error if the signature header is missing, malformed, stale
    /// or does not match, or if the payload is not an event.
    pub fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, WebhookError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        let header = signature_header.ok_or(WebhookError::MissingHeader)?;

        verify_signature(
            self.webhook_secret.expose_secret().as_bytes(),
            payload,
            header,
            now,
            WEBHOOK_TOLERANCE_SECONDS,
        )?;

        serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))
    }
}

/// Check a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against
/// `HMAC-SHA256(secret, "{t}.{payload}")`.
///
/// # Errors
/// See [`WebhookError`].
pub fn verify_signature(
    secret: &[u8],
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_seconds: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(WebhookError::MissingSignature);
    }
    if now.abs_diff(timestamp) > tolerance_seconds.unsigned_abs() {
        return Err(WebhookError::Stale);
    }

    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(WebhookError::Mismatch)
    }
}
