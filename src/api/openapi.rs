#![allow(clippy::needless_for_each)]

use utoipa::{
    openapi::{Contact, Info, InfoBuilder, License},
    OpenApi,
};

use crate::api::handlers::{addresses, auth, billing, cards, health, hearts, me, orders};
use crate::upstream::{
    address::{Address, ValidatedAddress},
    backend::{AuthUser, Session},
    fulfillment::OrderStatus,
    payments::{CardDetails, PaymentMethod, PortalSession, Subscription},
    renderer::{Modification, Render, RenderStatus},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup::signup,
        auth::verification::verify,
        auth::verification::resend,
        auth::login::login,
        auth::oauth::authorize,
        auth::oauth::callback,
        me::get_me,
        hearts::list_hearts,
        hearts::create_heart,
        hearts::update_heart,
        cards::generate_message,
        cards::generate_image,
        cards::create_render,
        cards::get_render,
        addresses::validate_address,
        orders::create_order,
        orders::get_order,
        billing::ensure_customer_handler,
        billing::create_subscription,
        billing::list_payment_methods,
        billing::delete_payment_method,
        billing::set_default_payment_method,
        billing::create_portal_session,
        billing::webhook,
    ),
    components(schemas(
        health::Health,
        auth::types::SignupRequest,
        auth::types::SignupResponse,
        auth::types::VerifyRequest,
        auth::types::ResendRequest,
        auth::types::LoginRequest,
        auth::types::AuthorizeResponse,
        Session,
        AuthUser,
        me::MeResponse,
        hearts::HeartFields,
        cards::MessageRequest,
        cards::MessageResponse,
        cards::ImageRequest,
        cards::ImageResponse,
        cards::RenderRequest,
        Modification,
        Render,
        RenderStatus,
        Address,
        ValidatedAddress,
        orders::CreateOrderRequest,
        OrderStatus,
        billing::CustomerResponse,
        billing::SubscriptionRequest,
        billing::PortalRequest,
        Subscription,
        PaymentMethod,
        CardDetails,
        PortalSession,
    )),
    tags(
        (name = "health", description = "Liveness and backend reachability"),
        (name = "auth", description = "Signup, email verification, login and OAuth with PKCE"),
        (name = "me", description = "The signed-in user"),
        (name = "hearts", description = "People the user sends cards to"),
        (name = "cards", description = "Card copy, artwork and template renders"),
        (name = "addresses", description = "Postal address validation"),
        (name = "orders", description = "Printed and mailed cards"),
        (name = "billing", description = "Subscriptions and saved cards"),
    )
)]
struct ApiDoc;

/// The served `OpenAPI` document, with `info` taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (
                Some(name).filter(|name| !name.is_empty()),
                Some(email).filter(|email| !email.is_empty()),
            )
        }
        None => (Some(author.trim()).filter(|name| !name.is_empty()), None),
    }
}
