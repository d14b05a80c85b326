//! Transactional email (Resend-style API).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "email";

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailMessage {
    /// The message carrying a signup verification code.
    #[must_use]
    pub fn verification_code(to: &str, code: &str, ttl: Duration) -> Self {
        let minutes = ttl.as_secs().div_ceil(60).max(1);
        Self {
            to: to.to_string(),
            subject: "Your Hearts verification code".to_string(),
            html: format!(
                "<p>Your verification code is <strong>{code}</strong>.</p>\
                 <p>It expires in {minutes} minutes.</p>"
            ),
            text: format!("Your verification code is {code}. It expires in {minutes} minutes."),
        }
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Clone, Debug)]
pub struct EmailClient {
    client: Client,
    endpoint: Endpoint,
    sender: String,
}

impl EmailClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Endpoint, sender: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
            sender: sender.to_string(),
        })
    }

    /// Hand a message to the provider, returning its message id.
    #[instrument(skip(self, message), fields(to = %message.to))]
    pub async fn send(&self, message: &EmailMessage) -> Result<String, UpstreamError> {
        let url = self.endpoint.url("/emails")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .json(&SendRequest {
                from: &self.sender,
                to: [&message.to],
                subject: &message.subject,
                html: &message.html,
                text: &message.text,
            })
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let sent: SendResponse = decode(SERVICE, response).await?;
        info!(id = %sent.id, "email accepted");
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[test]
    fn verification_message_mentions_code_and_expiry() {
        let message =
            EmailMessage::verification_code("a@b.com", "123456", Duration::from_secs(600));
        assert!(message.text.contains("123456"));
        assert!(message.text.contains("10 minutes"));
        assert!(message.html.contains("<strong>123456</strong>"));
    }

    #[tokio::test]
    async fn send_posts_message_and_returns_id() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "from": "Hearts <hello@hearts.cards>",
                "to": ["a@b.com"],
                "subject": "hi"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(SERVICE, &server.uri(), SecretString::from("re_test".to_string()))?;
        let client = EmailClient::new(endpoint, "Hearts <hello@hearts.cards>", Duration::from_secs(5))?;
        let id = client
            .send(&EmailMessage {
                to: "a@b.com".to_string(),
                subject: "hi".to_string(),
                html: "<p>hi</p>".to_string(),
                text: "hi".to_string(),
            })
            .await?;
        assert_eq!(id, "msg_1");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_send_is_an_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid `to` field"})),
            )
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(SERVICE, &server.uri(), SecretString::from("re_test".to_string()))?;
        let client = EmailClient::new(endpoint, "hello@hearts.cards", Duration::from_secs(5))?;
        let message = EmailMessage::verification_code("bad", "123456", Duration::from_secs(60));
        let err = client.send(&message).await.err().map(|e| e.public_message());
        assert_eq!(err.as_deref(), Some("Invalid `to` field"));
        Ok(())
    }
}
