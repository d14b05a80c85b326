//! Subscriptions and saved cards through the payment processor.
//!
//! Flow Overview:
//! 1) The processor customer id is kept on the user's `profiles` row and
//!    created on first use.
//! 2) Card operations check the card belongs to that customer; anything else
//!    reads as 404.
//! 3) Subscription status reaches `profiles` through the signed webhook.

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

use super::auth::{require_auth, AuthState, Principal};
use super::me::fetch_profile;
use super::{missing_payload, upstream_error_response, Upstreams};
use crate::upstream::backend::BackendAuth;
use crate::upstream::payments::{PaymentMethod, PortalSession, Subscription, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CustomerResponse {
    pub customer_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SubscriptionRequest {
    pub price_id: String,
    pub payment_method_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct PortalRequest {
    /// Where the portal sends the user back to; defaults to the frontend.
    pub return_url: Option<String>,
}

/// Return the caller's processor customer id, creating the customer and
/// recording it on the profile if needed.
async fn ensure_customer(upstreams: &Upstreams, principal: &Principal) -> Result<String, Response> {
    let profile = fetch_profile(&upstreams.backend, principal.user_id)
        .await
        .map_err(|err| upstream_error_response("fetch profile", &err))?;

    if let Some(customer_id) = profile
        .as_ref()
        .and_then(|profile| profile["stripe_customer_id"].as_str())
        .filter(|id| !id.is_empty())
    {
        return Ok(customer_id.to_string());
    }

    let email = principal
        .email
        .clone()
        .or_else(|| {
            profile
                .as_ref()
                .and_then(|profile| profile["email"].as_str().map(ToString::to_string))
        })
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Account has no email address".to_string(),
            )
                .into_response()
        })?;
    let full_name = profile
        .as_ref()
        .and_then(|profile| profile["full_name"].as_str());

    let user_id = principal.user_id.to_string();
    let customer = upstreams
        .payments
        .create_customer(&email, full_name, &user_id)
        .await
        .map_err(|err| upstream_error_response("create payment customer", &err))?;

    upstreams
        .backend
        .update(
            "profiles",
            BackendAuth::Service,
            &[("id", user_id)],
            &json!({ "stripe_customer_id": customer.id }),
        )
        .await
        .map_err(|err| upstream_error_response("store payment customer", &err))?;

    info!(user_id = %principal.user_id, customer_id = %customer.id, "payment customer created");
    Ok(customer.id)
}

/// Customer id already on the profile, without creating one.
async fn existing_customer(upstreams: &Upstreams, principal: &Principal) -> Result<Option<String>, Response> {
    let profile = fetch_profile(&upstreams.backend, principal.user_id)
        .await
        .map_err(|err| upstream_error_response("fetch profile", &err))?;
    Ok(profile
        .as_ref()
        .and_then(|profile| profile["stripe_customer_id"].as_str())
        .filter(|id| !id.is_empty())
        .map(ToString::to_string))
}

/// Ensure `payment_method_id` is one of the caller's saved cards.
async fn owned_payment_method(
    upstreams: &Upstreams,
    principal: &Principal,
    payment_method_id: &str,
) -> Result<String, Response> {
    let not_found = || (StatusCode::NOT_FOUND, "Payment method not found".to_string()).into_response();

    let Some(customer_id) = existing_customer(upstreams, principal).await? else {
        return Err(not_found());
    };

    let methods = upstreams
        .payments
        .list_payment_methods(&customer_id)
        .await
        .map_err(|err| upstream_error_response("list payment methods", &err))?;

    if methods.iter().any(|method| method.id == payment_method_id) {
        Ok(customer_id)
    } else {
        Err(not_found())
    }
}

#[utoipa::path(
    post,
    path = "/v1/billing/customer",
    responses(
        (status = 200, description = "Payment customer for the caller", body = CustomerResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "billing"
)]
pub async fn ensure_customer_handler(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match ensure_customer(&upstreams, &principal).await {
        Ok(customer_id) => (StatusCode::OK, Json(CustomerResponse { customer_id })).into_response(),
        Err(response) => response,
    }
}

#[utoipa::path(
    post,
    path = "/v1/billing/subscriptions",
    request_body = SubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = Subscription),
        (status = 400, description = "Missing price", body = String)
    ),
    tag = "billing"
)]
pub async fn create_subscription(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<SubscriptionRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let request: SubscriptionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    let price_id = request.price_id.trim();
    if price_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing price".to_string()).into_response();
    }

    let customer_id = match ensure_customer(&upstreams, &principal).await {
        Ok(customer_id) => customer_id,
        Err(response) => return response,
    };

    let subscription = match upstreams
        .payments
        .create_subscription(&customer_id, price_id, request.payment_method_id.as_deref())
        .await
    {
        Ok(subscription) => subscription,
        Err(err) => return upstream_error_response("create subscription", &err),
    };

    if let Err(err) = upstreams
        .backend
        .update(
            "profiles",
            BackendAuth::Service,
            &[("id", principal.user_id.to_string())],
            &json!({ "subscription_status": subscription.status }),
        )
        .await
    {
        // the webhook delivers the same status
        warn!("Failed to record subscription status: {err}");
    }

    (StatusCode::CREATED, Json(subscription)).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/billing/payment-methods",
    responses(
        (status = 200, description = "Saved cards", body = [PaymentMethod])
    ),
    tag = "billing"
)]
pub async fn list_payment_methods(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let customer_id = match existing_customer(&upstreams, &principal).await {
        Ok(Some(customer_id)) => customer_id,
        Ok(None) => return (StatusCode::OK, Json(Vec::<PaymentMethod>::new())).into_response(),
        Err(response) => return response,
    };

    match upstreams.payments.list_payment_methods(&customer_id).await {
        Ok(methods) => (StatusCode::OK, Json(methods)).into_response(),
        Err(err) => upstream_error_response("list payment methods", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/billing/payment-methods/{id}",
    params(("id" = String, Path, description = "Payment method id")),
    responses(
        (status = 204, description = "Card removed"),
        (status = 404, description = "Not one of the caller's cards", body = String)
    ),
    tag = "billing"
)]
pub async fn delete_payment_method(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    if let Err(response) = owned_payment_method(&upstreams, &principal, &id).await {
        return response;
    }

    match upstreams.payments.detach_payment_method(&id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => upstream_error_response("detach payment method", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/billing/payment-methods/{id}/default",
    params(("id" = String, Path, description = "Payment method id")),
    responses(
        (status = 204, description = "Default card updated"),
        (status = 404, description = "Not one of the caller's cards", body = String)
    ),
    tag = "billing"
)]
pub async fn set_default_payment_method(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let customer_id = match owned_payment_method(&upstreams, &principal, &id).await {
        Ok(customer_id) => customer_id,
        Err(response) => return response,
    };

    match upstreams
        .payments
        .set_default_payment_method(&customer_id, &id)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => upstream_error_response("set default payment method", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/billing/portal",
    request_body = PortalRequest,
    responses(
        (status = 200, description = "Billing portal session", body = PortalSession)
    ),
    tag = "billing"
)]
pub async fn create_portal_session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<PortalRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let request = payload.map(|Json(payload)| payload).unwrap_or_default();
    let frontend_base_url = auth_state.config().frontend_base_url();
    let return_url = match request.return_url {
        Some(url) if within_frontend(&url, frontend_base_url) => url,
        Some(url) => {
            debug!(return_url = %url, "ignoring return url outside the frontend");
            format!("{}/billing", frontend_base_url.trim_end_matches('/'))
        }
        None => format!("{}/billing", frontend_base_url.trim_end_matches('/')),
    };

    let customer_id = match ensure_customer(&upstreams, &principal).await {
        Ok(customer_id) => customer_id,
        Err(response) => return response,
    };

    match upstreams
        .payments
        .create_billing_portal_session(&customer_id, &return_url)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(err) => upstream_error_response("create billing portal session", &err),
    }
}

/// Same origin as the frontend and under its base path.
fn within_frontend(candidate: &str, frontend_base_url: &str) -> bool {
    let (Ok(candidate), Ok(frontend)) = (Url::parse(candidate), Url::parse(frontend_base_url))
    else {
        return false;
    };
    if !frontend.origin().is_tuple() || candidate.origin() != frontend.origin() {
        return false;
    }

    let base = frontend.path().trim_end_matches('/');
    base.is_empty()
        || candidate
            .path()
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Subscription status carried by a webhook event, if it is one we track.
fn subscription_update(event: &WebhookEvent) -> Option<(String, String)> {
    let object = &event.data.object;
    let customer = object["customer"].as_str()?.to_string();
    let status = match event.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            object["status"].as_str()?.to_string()
        }
        "customer.subscription.deleted" => "canceled".to_string(),
        _ => return None,
    };
    Some((customer, status))
}

#[utoipa::path(
    post,
    path = "/v1/billing/webhook",
    params(
        ("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")
    ),
    request_body(content = String, description = "Raw event payload"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Invalid signature or payload", body = String)
    ),
    tag = "billing"
)]
pub async fn webhook(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = match upstreams.payments.verify_webhook(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            warn!("Rejected payment webhook: {err}");
            return (StatusCode::BAD_REQUEST, "Invalid signature".to_string()).into_response();
        }
    };

    let Some((customer_id, status)) = subscription_update(&event) else {
        debug!(event_type = %event.event_type, "ignoring payment webhook");
        return StatusCode::OK.into_response();
    };

    match upstreams
        .backend
        .update(
            "profiles",
            BackendAuth::Service,
            &[("stripe_customer_id", customer_id.clone())],
            &json!({ "subscription_status": status }),
        )
        .await
    {
        Ok(rows) => {
            if rows.is_empty() {
                warn!(customer_id = %customer_id, "webhook for unknown customer");
            }
            info!(event_id = %event.id, customer_id = %customer_id, status = %status, "subscription status updated");
            StatusCode::OK.into_response()
        }
        // a non-2xx makes the processor retry the delivery
        Err(err) => upstream_error_response("apply subscription status", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::payments::WebhookEventData;
    use serde_json::Value;

    #[test]
    fn return_urls_must_stay_on_the_frontend() {
        let frontend = "https://hearts.cards";
        assert!(within_frontend("https://hearts.cards/billing?done=1", frontend));
        assert!(within_frontend("https://hearts.cards", frontend));
        assert!(!within_frontend("https://hearts.cards.evil.example/billing", frontend));
        assert!(!within_frontend("https://hearts.cards@evil.example/billing", frontend));
        assert!(!within_frontend("http://hearts.cards/billing", frontend));
        assert!(!within_frontend("https://hearts.cards:8443/billing", frontend));
        assert!(!within_frontend("/billing", frontend));
        assert!(!within_frontend("javascript:alert(1)", frontend));
    }

    #[test]
    fn return_urls_respect_the_frontend_path() {
        let frontend = "https://example.com/studio/";
        assert!(within_frontend("https://example.com/studio", frontend));
        assert!(within_frontend("https://example.com/studio/billing", frontend));
        assert!(!within_frontend("https://example.com/studio-evil/billing", frontend));
        assert!(!within_frontend("https://example.com/studio/../admin", frontend));
        assert!(!within_frontend("https://example.com/other", frontend));
    }

    fn event(event_type: &str, object: Value) -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            data: WebhookEventData { object },
        }
    }

    #[test]
    fn subscription_events_map_to_status() {
        assert_eq!(
            subscription_update(&event(
                "customer.subscription.updated",
                json!({"customer": "cus_1", "status": "past_due"})
            )),
            Some(("cus_1".to_string(), "past_due".to_string()))
        );
        assert_eq!(
            subscription_update(&event(
                "customer.subscription.deleted",
                json!({"customer": "cus_1", "status": "active"})
            )),
            Some(("cus_1".to_string(), "canceled".to_string()))
        );
    }

    #[test]
    fn other_events_are_ignored() {
        assert_eq!(
            subscription_update(&event("invoice.paid", json!({"customer": "cus_1"}))),
            None
        );
        assert_eq!(
            subscription_update(&event(
                "customer.subscription.updated",
                json!({"status": "active"})
            )),
            None
        );
    }
}
