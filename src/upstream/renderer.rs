//! Card template rendering (Bannerbear-style image API).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "renderer";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Pending,
    Completed,
    Failed,
}

impl RenderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One layer override on a template, e.g. the message text or a photo.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Render {
    #[serde(alias = "uid")]
    pub id: String,
    pub status: RenderStatus,
    #[serde(alias = "image_url")]
    pub url: Option<String>,
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    template: &'a str,
    modifications: &'a [Modification],
}

#[derive(Clone, Debug)]
pub struct RendererClient {
    client: Client,
    endpoint: Endpoint,
}

impl RendererClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
        })
    }

    #[instrument(skip(self, modifications))]
    pub async fn generate_card(
        &self,
        template: &str,
        modifications: &[Modification],
    ) -> Result<Render, UpstreamError> {
        let url = self.endpoint.url("/v2/images")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .json(&RenderRequest {
                template,
                modifications,
            })
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    #[instrument(skip(self))]
    pub async fn get_status(&self, id: &str) -> Result<Render, UpstreamError> {
        let url = self.endpoint.url_segments(&["v2", "images", id])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.endpoint.api_key())
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    /// Poll until the render reaches a terminal status or `attempts` run out,
    /// returning the last status seen.
    #[instrument(skip(self))]
    pub async fn await_render(
        &self,
        id: &str,
        attempts: u32,
        every: Duration,
    ) -> Result<Render, UpstreamError> {
        let mut render = self.get_status(id).await?;
        for attempt in 1..attempts {
            if render.status.is_terminal() {
                break;
            }
            debug!(attempt, "render still pending");
            tokio::time::sleep(every).await;
            render = self.get_status(id).await?;
        }
        Ok(render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client(uri: &str) -> Result<RendererClient> {
        let endpoint = Endpoint::new(SERVICE, uri, SecretString::from("bb_test".to_string()))?;
        Ok(RendererClient::new(endpoint, Duration::from_secs(5))?)
    }

    #[test]
    fn modifications_skip_empty_fields() -> Result<()> {
        let modification = Modification {
            name: "message".to_string(),
            text: Some("Happy birthday".to_string()),
            image_url: None,
        };
        assert_eq!(
            serde_json::to_value(&modification)?,
            json!({"name": "message", "text": "Happy birthday"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn generate_card_sends_template() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/images"))
            .and(body_partial_json(json!({"template": "tpl_birthday"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "uid": "r1", "status": "pending", "image_url": null
            })))
            .mount(&server)
            .await;

        let render = client(&server.uri())?
            .generate_card("tpl_birthday", &[])
            .await?;
        assert_eq!(render.id, "r1");
        assert_eq!(render.status, RenderStatus::Pending);
        assert_eq!(render.url, None);
        Ok(())
    }

    #[tokio::test]
    async fn await_render_stops_at_terminal_status() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/images/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": "r1", "status": "pending"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/images/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": "r1", "status": "completed", "image_url": "https://cdn.example/r1.png"
            })))
            .mount(&server)
            .await;

        let render = client(&server.uri())?
            .await_render("r1", 10, Duration::from_millis(5))
            .await?;
        assert_eq!(render.status, RenderStatus::Completed);
        assert_eq!(render.url.as_deref(), Some("https://cdn.example/r1.png"));
        Ok(())
    }

    #[tokio::test]
    async fn await_render_gives_up_after_attempts() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/images/r2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": "r2", "status": "pending"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let render = client(&server.uri())?
            .await_render("r2", 3, Duration::from_millis(1))
            .await?;
        assert_eq!(render.status, RenderStatus::Pending);
        Ok(())
    }
}
