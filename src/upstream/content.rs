//! AI text and image generation (OpenAI-style API).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use super::{decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "content";

const SYSTEM_PROMPT: &str = "You write short, warm greeting card messages. \
    Reply with the message only, no preamble, at most 80 words.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ContentClient {
    client: Client,
    endpoint: Endpoint,
    text_model: String,
    image_model: String,
}

impl ContentClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Endpoint,
        text_model: &str,
        image_model: &str,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
        })
    }

    #[instrument(skip(self, prompt))]
    pub async fn generate_message(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = self.endpoint.url("/v1/chat/completions")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .json(&ChatRequest {
                model: &self.text_model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt,
                    },
                ],
            })
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let chat: ChatResponse = decode(SERVICE, response).await?;
        chat.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| UpstreamError::payload(SERVICE, "completion without content"))
    }

    #[instrument(skip(self, prompt))]
    pub async fn generate_image(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = self.endpoint.url("/v1/images/generations")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.endpoint.api_key())
            .json(&ImageRequest {
                model: &self.image_model,
                prompt,
                n: 1,
                size: "1024x1024",
            })
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let images: ImageResponse = decode(SERVICE, response).await?;
        images
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or_else(|| UpstreamError::payload(SERVICE, "image response without url"))
    }
}

/// Build the prompt for a card message.
#[must_use]
pub fn message_prompt(recipient: &str, relationship: Option<&str>, occasion: &str, tone: &str) -> String {
    match relationship {
        Some(relationship) => format!(
            "Write a {tone} {occasion} card message for {recipient}, my {relationship}."
        ),
        None => format!("Write a {tone} {occasion} card message for {recipient}."),
    }
}
