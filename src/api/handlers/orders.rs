//! Printed card orders.
//!
//! The recipient address is validated first and the normalized form is what
//! goes to the printer.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::auth::require_auth;
use super::{missing_payload, upstream_error_response, Upstreams};
use crate::upstream::address::Address;
use crate::upstream::fulfillment::{OrderStatus, PrintOrder};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateOrderRequest {
    pub image_url: String,
    pub recipient_name: String,
    pub recipient: Address,
    pub message: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Print order created", body = OrderStatus),
        (status = 400, description = "Invalid order", body = String),
        (status = 422, description = "Recipient address is not deliverable", body = String)
    ),
    tag = "orders"
)]
pub async fn create_order(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<CreateOrderRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let request: CreateOrderRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if request.image_url.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing card image".to_string()).into_response();
    }
    let recipient_name = request.recipient_name.trim();
    if recipient_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing recipient name".to_string()).into_response();
    }

    let validated = match upstreams.address.validate(&request.recipient).await {
        Ok(validated) => validated,
        Err(err) => return upstream_error_response("validate recipient address", &err),
    };

    let order = PrintOrder {
        image_url: request.image_url,
        recipient_name: recipient_name.to_string(),
        recipient: validated.address,
        message: request.message,
        reference: Some(principal.user_id.to_string()),
    };

    match upstreams.fulfillment.create_order(&order).await {
        Ok(status) => {
            info!(user_id = %principal.user_id, order_id = %status.id, "print order placed");
            (StatusCode::CREATED, Json(status)).into_response()
        }
        Err(err) => upstream_error_response("create print order", &err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = String, Path, description = "Print order id")),
    responses(
        (status = 200, description = "Print order status", body = OrderStatus),
        (status = 404, description = "Unknown order or placed by another user", body = String)
    ),
    tag = "orders"
)]
pub async fn get_order(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match upstreams.fulfillment.get_order(&id).await {
        Ok(status) if placed_by(&status, &principal.user_id.to_string()) => {
            (StatusCode::OK, Json(status)).into_response()
        }
        Ok(_) => {
            debug!(user_id = %principal.user_id, order_id = %id, "order belongs to another user");
            (StatusCode::NOT_FOUND, "Order not found".to_string()).into_response()
        }
        Err(err) => upstream_error_response("fetch print order", &err),
    }
}

// orders carry the placing user's id as their reference
fn placed_by(status: &OrderStatus, user_id: &str) -> bool {
    status.reference.as_deref() == Some(user_id)
}
