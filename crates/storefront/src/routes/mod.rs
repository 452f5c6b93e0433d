//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Catalog home page
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (database)
//!
//! # API
//! GET  /api/products           - All products
//! GET  /api/products/{id}      - One product
//!
//! # Checkout
//! POST /checkout/intent        - Validate cart, create payment intent
//! POST /checkout               - Record the order after confirmation
//!
//! # Stripe
//! POST /stripe/webhook/        - Webhook deliveries
//!
//! # Staff (bearer token)
//! POST /staff/media            - Upload a media file
//!
//! # Files
//! /static/*                    - Collected static files (local mode)
//! /media/*                     - Media saved to local disk
//! ```

pub mod checkout;
pub mod health;
pub mod home;
pub mod media;
pub mod products;
pub mod webhook;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::middleware::{request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Largest accepted media upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Create the product API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index))
        .route("/products/{id}", get(products::show))
}

/// Create the checkout router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::complete))
        .route("/intent", post(checkout::create_intent))
}

/// Create the staff router.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/media", post(media::upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
        .nest("/checkout", checkout_routes())
        .route("/stripe/webhook/", post(webhook::stripe_webhook))
        .route("/stripe/webhook", post(webhook::stripe_webhook))
        .nest("/staff", staff_routes())
}

/// The full application: routes, local file serving and middleware.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let storage = &state.config().storage;
    let static_files = ServeDir::new(&storage.static_root);
    let media_files = ServeDir::new(&storage.media_root);

    Router::new()
        .merge(routes())
        .nest_service("/static", static_files)
        .nest_service("/media", media_files)
        .layer(from_fn_with_state(
            state.security_headers(),
            security_headers_middleware,
        ))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
