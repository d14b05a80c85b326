//! Postal address validation (Lob-style verification API).

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use utoipa::ToSchema;

use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "address";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct ValidatedAddress {
    pub address: Address,
    pub deliverability: String,
}

impl ValidatedAddress {
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        self.deliverability.starts_with("deliverable")
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    primary_line: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_line: Option<&'a str>,
    city: &'a str,
    state: &'a str,
    zip_code: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    primary_line: String,
    #[serde(default)]
    secondary_line: String,
    components: Components,
    deliverability: String,
}

#[derive(Deserialize)]
struct Components {
    city: String,
    state: String,
    zip_code: String,
    #[serde(default)]
    zip_code_plus_4: String,
}

#[derive(Clone, Debug)]
pub struct AddressClient {
    client: Client,
    endpoint: Endpoint,
}

impl AddressClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
        })
    }

    /// Normalize an address; undeliverable addresses are a 422 status error.
    #[instrument(skip(self, address))]
    pub async fn validate(&self, address: &Address) -> Result<ValidatedAddress, UpstreamError> {
        let url = self.endpoint.url("/v1/us_verifications")?;
        let response = self
            .client
            .post(url)
            .basic_auth(self.endpoint.api_key(), Some(""))
            .json(&VerifyRequest {
                primary_line: &address.line1,
                secondary_line: address.line2.as_deref(),
                city: &address.city,
                state: &address.state,
                zip_code: &address.postal_code,
            })
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let verified: VerifyResponse = decode(SERVICE, response).await?;

        let postal_code = if verified.components.zip_code_plus_4.is_empty() {
            verified.components.zip_code
        } else {
            format!(
                "{}-{}",
                verified.components.zip_code, verified.components.zip_code_plus_4
            )
        };

        let validated = ValidatedAddress {
            address: Address {
                line1: verified.primary_line,
                line2: Some(verified.secondary_line).filter(|line| !line.is_empty()),
                city: verified.components.city,
                state: verified.components.state,
                postal_code,
                country: address.country.clone(),
            },
            deliverability: verified.deliverability,
        };

        if validated.is_deliverable() {
            Ok(validated)
        } else {
            Err(UpstreamError::Status {
                service: SERVICE,
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: format!("Address is not deliverable ({})", validated.deliverability),
            })
        }
    }
}
