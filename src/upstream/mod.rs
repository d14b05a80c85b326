//! HTTP clients for the external collaborators.
//!
//! Each collaborator gets a small typed client that owns a `reqwest::Client`
//! and an [`Endpoint`]. Non-2xx responses are turned into
//! [`UpstreamError::Status`] carrying the collaborator's own error message so
//! handlers can pass client errors through and hide server errors.

pub mod address;
pub mod backend;
pub mod content;
pub mod email;
pub mod fulfillment;
pub mod payments;
pub mod renderer;

use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::APP_USER_AGENT;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} responded {status}: {message}")]
    Status {
        service: &'static str,
        status: StatusCode,
        message: String,
    },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned an unexpected payload: {message}")]
    Payload {
        service: &'static str,
        message: String,
    },
    #[error("invalid {service} endpoint: {message}")]
    Endpoint {
        service: &'static str,
        message: String,
    },
    #[error("{service} id rejected: {id:?}")]
    InvalidId { service: &'static str, id: String },
}

impl UpstreamError {
    pub(crate) fn payload(service: &'static str, message: impl Into<String>) -> Self {
        Self::Payload {
            service,
            message: message.into(),
        }
    }

    /// Status to report to our own caller.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } if status.is_client_error() => *status,
            Self::Transport { source, .. } if source.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Status { .. } | Self::Transport { .. } | Self::Payload { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Endpoint { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidId { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Message safe to show to the end user.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Status { status, message, .. } if status.is_client_error() => message.clone(),
            Self::Transport { source, .. } if source.is_timeout() => {
                "Upstream service timed out".to_string()
            }
            Self::Endpoint { .. } => "Service misconfigured".to_string(),
            Self::InvalidId { .. } => "Not found".to_string(),
            _ => "Upstream service unavailable".to_string(),
        }
    }
}

/// Base URL plus credential for one collaborator.
#[derive(Clone)]
pub struct Endpoint {
    service: &'static str,
    base_url: Url,
    api_key: SecretString,
}

impl Endpoint {
    /// # Errors
    /// Returns an error if `base_url` is not an absolute http(s) URL.
    pub fn new(
        service: &'static str,
        base_url: &str,
        api_key: SecretString,
    ) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(base_url).map_err(|e| UpstreamError::Endpoint {
            service,
            message: format!("{base_url}: {e}"),
        })?;

        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(UpstreamError::Endpoint {
                    service,
                    message: format!("unsupported scheme {scheme}"),
                })
            }
        }

        Ok(Self {
            service,
            base_url,
            api_key,
        })
    }

    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Append `path` to the base URL, keeping any base path prefix.
    pub(crate) fn url(&self, path: &str) -> Result<Url, UpstreamError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let url = format!("{base}/{path}");

        debug!(service = self.service, "endpoint URL: {}", url);

        Url::parse(&url).map_err(|e| UpstreamError::Endpoint {
            service: self.service,
            message: format!("{url}: {e}"),
        })
    }

    /// Base URL followed by `segments`, each one a single path segment.
    ///
    /// Segments carry ids from our callers, so anything outside
    /// `[A-Za-z0-9_-]` is refused before a request goes out.
    pub(crate) fn url_segments(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        if let Some(bad) = segments.iter().find(|segment| !is_plain_segment(segment)) {
            return Err(UpstreamError::InvalidId {
                service: self.service,
                id: (*bad).to_string(),
            });
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::Endpoint {
                service: self.service,
                message: format!("{} cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);

        debug!(service = self.service, "endpoint URL: {}", url);

        Ok(url)
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"***")
            .finish()
    }
}

/// Shared client builder: crate user agent and a request timeout.
pub(crate) fn http_client(service: &'static str, timeout: Duration) -> Result<Client, UpstreamError> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|source| UpstreamError::Transport { service, source })
}

pub(crate) fn transport(service: &'static str) -> impl Fn(reqwest::Error) -> UpstreamError {
    move |source| UpstreamError::Transport { service, source }
}

/// Decode a successful JSON response or turn the failure into an error.
pub(crate) async fn decode<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, UpstreamError> {
    let response = check(service, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| UpstreamError::payload(service, e.to_string()))
}

/// Fail on a non-2xx status, otherwise hand the response back.
pub(crate) async fn check(
    service: &'static str,
    response: Response,
) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        service,
        status,
        message: error_message(&body),
    })
}

/// Pull a human readable message out of a collaborator error body.
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["error_description", "msg", "message"] {
            if let Some(message) = json[key].as_str() {
                return message.to_string();
            }
        }
        if let Some(message) = json["error"]["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = json["error"].as_str() {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error message".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> Result<Endpoint, UpstreamError> {
        Endpoint::new("test", base, SecretString::from("key".to_string()))
    }

    #[test]
    fn url_keeps_base_path_prefix() -> Result<(), UpstreamError> {
        let endpoint = endpoint("https://project.example.co/api/")?;
        let url = endpoint.url("/auth/v1/signup")?;
        assert_eq!(url.as_str(), "https://project.example.co/api/auth/v1/signup");
        Ok(())
    }

    #[test]
    fn url_without_prefix() -> Result<(), UpstreamError> {
        let endpoint = endpoint("http://127.0.0.1:8080")?;
        let url = endpoint.url("v1/customers")?;
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v1/customers");
        Ok(())
    }

    #[test]
    fn url_segments_keeps_base_path_prefix() -> Result<(), UpstreamError> {
        let endpoint = endpoint("https://print.example.com/api/")?;
        let url = endpoint.url_segments(&["v1", "orders", "ord_123"])?;
        assert_eq!(url.as_str(), "https://print.example.com/api/v1/orders/ord_123");
        Ok(())
    }

    #[test]
    fn url_segments_refuses_traversal() -> Result<(), UpstreamError> {
        let endpoint = endpoint("https://print.example.com")?;
        for id in ["../../admin/secret", "..", "a/b", "a%2Fb", "a?b=1", "a#b", ""] {
            let err = endpoint
                .url_segments(&["v1", "orders", id])
                .err()
                .map(|err| err.status_code());
            assert_eq!(err, Some(StatusCode::NOT_FOUND), "{id}");
        }
        Ok(())
    }

    #[test]
    fn endpoint_rejects_bad_urls() {
        assert!(endpoint("not a url").is_err());
        assert!(endpoint("ftp://files.example.com").is_err());
    }

    #[test]
    fn endpoint_debug_redacts_key() -> Result<(), UpstreamError> {
        let rendered = format!("{:?}", endpoint("https://api.example.com")?);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("key\""));
        Ok(())
    }

    #[test]
    fn error_message_prefers_known_fields() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Bad code"}"#),
            "Bad code"
        );
        assert_eq!(error_message(r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(
            error_message(r#"{"error":{"message":"No such customer","type":"invalid_request_error"}}"#),
            "No such customer"
        );
        assert_eq!(error_message(r#"{"error":"not_found"}"#), "not_found");
        assert_eq!(error_message("plain failure "), "plain failure");
        assert_eq!(error_message(""), "no error message");
    }

    #[test]
    fn status_code_passes_client_errors_through() {
        let err = UpstreamError::Status {
            service: "test",
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "bad input".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.public_message(), "bad input");

        let err = UpstreamError::Status {
            service: "test",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "stack trace".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.public_message(), "Upstream service unavailable");

        let err = UpstreamError::payload("test", "missing id");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
