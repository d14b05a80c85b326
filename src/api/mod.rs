//! HTTP surface: router, middleware stack and the server loop.

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use url::Url;

use crate::cli::telemetry;
use crate::stores::spawn_cleanup;
use handlers::{
    addresses,
    auth::{self, AuthState},
    billing, cards, health, hearts, me, orders, Upstreams,
};

/// Origin (`scheme://host[:port]`) of the frontend, the only origin CORS allows.
///
/// # Errors
/// Returns an error if the URL does not parse or has no host
pub fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(anyhow!("Frontend base URL has no origin: {frontend_base_url}"));
    }
    HeaderValue::from_str(&origin.ascii_serialization()).context("Invalid frontend origin")
}

/// Build the application router with all routes and layers.
///
/// # Errors
/// Returns an error if the configured frontend URL cannot be used as a CORS origin
pub fn app(auth_state: Arc<AuthState>, upstreams: Arc<Upstreams>) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(frontend_origin(auth_state.config().frontend_base_url())?);

    let v1 = Router::new()
        .route("/auth/signup", post(auth::signup::signup))
        .route("/auth/verify", post(auth::verification::verify))
        .route("/auth/resend", post(auth::verification::resend))
        .route("/auth/login", post(auth::login::login))
        .route("/auth/oauth/authorize", get(auth::oauth::authorize))
        .route("/auth/oauth/callback", get(auth::oauth::callback))
        .route("/me", get(me::get_me))
        .route("/hearts", get(hearts::list_hearts).post(hearts::create_heart))
        .route("/hearts/:id", patch(hearts::update_heart))
        .route("/cards/message", post(cards::generate_message))
        .route("/cards/image", post(cards::generate_image))
        .route("/cards/renders", post(cards::create_render))
        .route("/cards/renders/:id", get(cards::get_render))
        .route("/addresses/validate", post(addresses::validate_address))
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/billing/customer", post(billing::ensure_customer_handler))
        .route("/billing/subscriptions", post(billing::create_subscription))
        .route("/billing/payment-methods", get(billing::list_payment_methods))
        .route(
            "/billing/payment-methods/:id",
            delete(billing::delete_payment_method),
        )
        .route(
            "/billing/payment-methods/:id/default",
            post(billing::set_default_payment_method),
        )
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/billing/webhook", post(billing::webhook));

    let app = Router::new()
        .nest("/v1", v1)
        .route("/api-docs/openapi.json", get(|| async { Json(openapi()) }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(upstreams.clone())),
        )
        .route(
            "/health",
            get(health::health).options(health::health),
        )
        .layer(Extension(upstreams));

    Ok(app)
}

/// Run the server until ctrl-c.
///
/// # Errors
/// Returns an error if the router cannot be built or the server fails to start
pub async fn new(
    port: u16,
    auth_state: Arc<AuthState>,
    upstreams: Arc<Upstreams>,
    cleanup_every: Duration,
) -> Result<()> {
    let cleanup = spawn_cleanup(
        auth_state.codes().clone(),
        auth_state.pkce().clone(),
        cleanup_every,
    );

    let app = app(auth_state, upstreams)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    cleanup.abort();
    telemetry::shutdown_tracer();

    Ok(())
}

// span; headers are left out since they carry bearer tokens
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method().as_str();
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http.request", method, path, request_id)
}
