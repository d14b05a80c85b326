//! Print-and-mail fulfillment.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::address::Address;
use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "fulfillment";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct PrintOrder {
    /// Finished card artwork.
    pub image_url: String,
    pub recipient_name: String,
    pub recipient: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Our own reference, echoed back by the printer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub id: String,
    pub status: String,
    /// The reference sent with the order, our user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FulfillmentClient {
    client: Client,
    endpoint: Endpoint,
}

impl FulfillmentClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
        })
    }

    #[instrument(skip(self, order))]
    pub async fn create_order(&self, order: &PrintOrder) -> Result<OrderStatus, UpstreamError> {
        let url = self.endpoint.url("/v1/orders")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .json(order)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let status: OrderStatus = decode(SERVICE, response).await?;
        info!(id = %status.id, status = %status.status, "print order created");
        Ok(status)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: &str) -> Result<OrderStatus, UpstreamError> {
        let url = self.endpoint.url_segments(&["v1", "orders", id])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.endpoint.api_key())
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use reqwest::StatusCode;
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client(uri: &str) -> Result<FulfillmentClient> {
        let endpoint = Endpoint::new(SERVICE, uri, SecretString::from("pk_test".to_string()))?;
        Ok(FulfillmentClient::new(endpoint, Duration::from_secs(5))?)
    }

    #[tokio::test]
    async fn create_order_returns_status() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(body_partial_json(json!({
                "recipient_name": "Ana",
                "recipient": {"city": "Springfield"}
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "ord_1", "status": "received"})),
            )
            .mount(&server)
            .await;

        let order = PrintOrder {
            image_url: "https://cdn.example/card.png".to_string(),
            recipient_name: "Ana".to_string(),
            recipient: Address {
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62701".to_string(),
                country: "US".to_string(),
            },
            message: None,
            reference: None,
        };
        let status = client(&server.uri())?.create_order(&order).await?;
        assert_eq!(
            status,
            OrderStatus {
                id: "ord_1".to_string(),
                status: "received".to_string(),
                reference: None,
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/orders/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Order not found"})))
            .mount(&server)
            .await;

        let err = client(&server.uri())?.get_order("missing").await.err();
        assert_eq!(err.map(|e| e.status_code()), Some(StatusCode::NOT_FOUND));
        Ok(())
    }

    #[tokio::test]
    async fn order_ids_stay_inside_the_orders_path() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/admin/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x", "status": "leaked"})))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server.uri())?;
        for id in ["../../admin/secret", "..%2F..%2Fadmin%2Fsecret"] {
            let err = client.get_order(id).await.err();
            assert_eq!(err.map(|e| e.status_code()), Some(StatusCode::NOT_FOUND));
        }
        Ok(())
    }
}
