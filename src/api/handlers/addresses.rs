use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::auth::require_auth;
use super::{missing_payload, upstream_error_response, Upstreams};
use crate::upstream::address::{Address, ValidatedAddress};

#[utoipa::path(
    post,
    path = "/v1/addresses/validate",
    request_body = Address,
    responses(
        (status = 200, description = "Normalized, deliverable address", body = ValidatedAddress),
        (status = 422, description = "Address is not deliverable", body = String)
    ),
    tag = "addresses"
)]
pub async fn validate_address(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<Address>>,
) -> impl IntoResponse {
    if let Err(response) = require_auth(&headers, &upstreams.backend).await {
        return response;
    }

    let address: Address = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    match upstreams.address.validate(&address).await {
        Ok(validated) => (StatusCode::OK, Json(validated)).into_response(),
        Err(err) => upstream_error_response("validate address", &err),
    }
}
