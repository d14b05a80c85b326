//! Card content: AI message and artwork, and template renders.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::require_auth;
use super::hearts::fetch_owned_heart;
use super::{missing_payload, upstream_error_response, Upstreams};
use crate::upstream::content::message_prompt;
use crate::upstream::renderer::{Modification, Render, RenderStatus};

const DEFAULT_TONE: &str = "heartfelt";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageRequest {
    /// Take the recipient from this heart.
    pub heart_id: Option<Uuid>,
    /// Recipient name when no heart is given.
    pub recipient_name: Option<String>,
    pub occasion: String,
    pub tone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImageRequest {
    pub prompt: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImageResponse {
    pub url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RenderRequest {
    pub template: String,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    /// Poll until the render finishes before answering.
    #[serde(default)]
    pub wait: bool,
}

#[utoipa::path(
    post,
    path = "/v1/cards/message",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Generated card message", body = MessageResponse),
        (status = 400, description = "Missing recipient or occasion", body = String),
        (status = 404, description = "Heart not found", body = String)
    ),
    tag = "cards"
)]
pub async fn generate_message(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<MessageRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let request: MessageRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let occasion = request.occasion.trim();
    if occasion.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing occasion".to_string()).into_response();
    }

    let (recipient, relationship) = if let Some(heart_id) = request.heart_id {
        match fetch_owned_heart(
            &upstreams.backend,
            &principal.access_token,
            principal.user_id,
            heart_id,
        )
        .await
        {
            Ok(Some(heart)) => (
                heart["name"].as_str().unwrap_or_default().to_string(),
                heart["relationship"].as_str().map(ToString::to_string),
            ),
            Ok(None) => {
                return (StatusCode::NOT_FOUND, "Heart not found".to_string()).into_response()
            }
            Err(err) => return upstream_error_response("fetch heart", &err),
        }
    } else {
        (
            request
                .recipient_name
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string(),
            None,
        )
    };

    if recipient.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing recipient".to_string()).into_response();
    }

    let tone = request
        .tone
        .as_deref()
        .map(str::trim)
        .filter(|tone| !tone.is_empty())
        .unwrap_or(DEFAULT_TONE);
    let prompt = message_prompt(&recipient, relationship.as_deref(), occasion, tone);

    match upstreams.content.generate_message(&prompt).await {
        Ok(message) => (StatusCode::OK, Json(MessageResponse { message })).into_response(),
        Err(err) => upstream_error_response("generate card message", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/cards/image",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Generated card artwork", body = ImageResponse),
        (status = 400, description = "Missing prompt", body = String)
    ),
    tag = "cards"
)]
pub async fn generate_image(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<ImageRequest>>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &upstreams.backend).await {
        return response;
    }

    let request: ImageRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing prompt".to_string()).into_response();
    }

    match upstreams.content.generate_image(prompt).await {
        Ok(url) => (StatusCode::OK, Json(ImageResponse { url })).into_response(),
        Err(err) => upstream_error_response("generate card image", &err),
    }
}

fn render_response(render: Render) -> axum::response::Response {
    match render.status {
        RenderStatus::Completed => (StatusCode::CREATED, Json(render)).into_response(),
        RenderStatus::Pending => (StatusCode::ACCEPTED, Json(render)).into_response(),
        RenderStatus::Failed => {
            error!(render_id = %render.id, "card render failed");
            (StatusCode::BAD_GATEWAY, "Card render failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/cards/renders",
    request_body = RenderRequest,
    responses(
        (status = 201, description = "Render completed", body = Render),
        (status = 202, description = "Render queued", body = Render),
        (status = 400, description = "Missing template", body = String),
        (status = 502, description = "Render failed", body = String)
    ),
    tag = "cards"
)]
pub async fn create_render(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<RenderRequest>>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &upstreams.backend).await {
        return response;
    }

    let request: RenderRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let template = request.template.trim();
    if template.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing template".to_string()).into_response();
    }

    let render = match upstreams
        .renderer
        .generate_card(template, &request.modifications)
        .await
    {
        Ok(render) => render,
        Err(err) => return upstream_error_response("start card render", &err),
    };

    info!(render_id = %render.id, "card render started");

    if !request.wait || render.status.is_terminal() {
        return render_response(render);
    }

    let polling = upstreams.render_polling;
    match upstreams
        .renderer
        .await_render(&render.id, polling.attempts, polling.interval)
        .await
    {
        Ok(render) => render_response(render),
        Err(err) => upstream_error_response("poll card render", &err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/cards/renders/{id}",
    params(("id" = String, Path, description = "Render id")),
    responses(
        (status = 200, description = "Render status", body = Render),
        (status = 404, description = "Unknown render", body = String)
    ),
    tag = "cards"
)]
pub async fn get_render(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &upstreams.backend).await {
        return response;
    }

    match upstreams.renderer.get_status(&id).await {
        Ok(render) => (StatusCode::OK, Json(render)).into_response(),
        Err(err) => upstream_error_response("fetch card render", &err),
    }
}
