//! Checkout.
//!
//! Two steps, mirroring Stripe's Payment Element flow:
//!
//! 1. `POST /checkout/intent` validates the cart against the catalog and
//!    creates a payment intent carrying the cart snapshot, the username and
//!    the save-info flag as metadata. The browser confirms the payment with
//!    the returned client secret.
//! 2. `POST /checkout` records the order once the browser has confirmed.
//!    The client secret must match the intent's own, and the intent must be
//!    confirmed. The cart is read back from the intent metadata, so the
//!    order matches what was charged. If the webhook got there first the
//!    existing order is returned.

use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use mercato_core::{Email, PaymentIntentId, PaymentStatus, Price};

use crate::error::{AppError, add_breadcrumb};
use crate::models::{CreateOutcome, DeliveryDetails, NewOrder, NewOrderLine};
use crate::state::AppState;
use crate::stripe::{CreatePaymentIntent, StripeError, constant_time_compare};
use crate::webhooks::{ParsedCart, build_lines, order_total, parse_cart};

/// Metadata value for shoppers who are not logged in.
const ANONYMOUS_USERNAME: &str = "AnonymousUser";

/// Intent statuses that mean the shopper has confirmed the payment.
const CONFIRMED_STATUSES: [&str; 3] = ["succeeded", "processing", "requires_capture"];

#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    /// Product id to quantity.
    pub cart: serde_json::Value,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub save_info: bool,
}

#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub client_secret: String,
    pub payment_intent: String,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: &'static str,
    pub order_total: Decimal,
    pub delivery_cost: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub client_secret: String,
    pub details: DeliveryDetails,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_number: String,
    pub status: PaymentStatus,
    pub grand_total: Decimal,
    /// False when the order already existed (webhook or resubmission).
    pub created: bool,
}

/// `POST /checkout/intent`
#[instrument(skip(state, request))]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, AppError> {
    let cart = parse_cart(&request.cart.to_string())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if cart.skipped > 0 {
        return Err(AppError::BadRequest(
            "cart contains entries with invalid product ids or quantities".to_string(),
        ));
    }
    if cart.entries.is_empty() {
        return Err(AppError::BadRequest("cart is empty".to_string()));
    }

    let lines = priced_lines(&state, &cart).await?;
    let pricing = state.config().pricing;
    let total = order_total(&lines);
    let grand_total = pricing.grand_total(total);

    let currency = state.config().stripe.currency;
    let amount = Price::new(grand_total, currency)
        .minor_units()
        .ok_or_else(|| AppError::Internal(format!("order total {grand_total} out of range")))?;

    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(ANONYMOUS_USERNAME);

    let intent = state
        .gateway()
        .create_payment_intent(CreatePaymentIntent {
            amount,
            currency: currency.stripe_code().to_string(),
            metadata: vec![
                ("cart".to_string(), cart.raw.to_string()),
                ("username".to_string(), username.to_string()),
                ("save_info".to_string(), request.save_info.to_string()),
            ],
        })
        .await?;

    let client_secret = intent
        .client_secret
        .clone()
        .ok_or_else(|| AppError::Internal("payment intent has no client secret".to_string()))?;

    add_breadcrumb(
        "checkout",
        "Payment intent created",
        &[("payment_intent", intent.id.as_str())],
    );
    info!(payment_intent = %intent.id, amount, "Checkout started");

    Ok(Json(IntentResponse {
        client_secret,
        payment_intent: intent.id.to_string(),
        amount,
        currency: currency.stripe_code(),
        order_total: total,
        delivery_cost: pricing.delivery_cost(total),
        grand_total,
    }))
}

/// `POST /checkout`
#[instrument(skip(state, request))]
pub async fn complete(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let details = validate_details(request.details)?;
    let stripe_pid = PaymentIntentId::from_client_secret(&request.client_secret)
        .map_err(|e| AppError::BadRequest(format!("invalid client secret: {e}")))?;

    let intent = state
        .gateway()
        .retrieve_payment_intent(&stripe_pid, &[])
        .await
        .map_err(|e| match e {
            StripeError::NotFound(id) => AppError::NotFound(format!("payment intent {id}")),
            other => AppError::Stripe(other),
        })?;

    // The id is readable from any secret-shaped string; only the full secret
    // proves the caller holds this intent.
    let secret_matches = intent
        .client_secret
        .as_deref()
        .is_some_and(|secret| constant_time_compare(secret, &request.client_secret));
    if !secret_matches {
        warn!(payment_intent = %intent.id, "Checkout client secret does not match the payment intent");
        return Err(AppError::NotFound(format!("payment intent {stripe_pid}")));
    }
    if !CONFIRMED_STATUSES.contains(&intent.status.as_str()) {
        return Err(AppError::BadRequest(format!(
            "payment not confirmed (status {})",
            intent.status
        )));
    }

    let raw_cart = intent
        .metadata_value("cart")
        .ok_or_else(|| AppError::BadRequest("payment intent carries no cart".to_string()))?;
    let cart = parse_cart(raw_cart).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let products = state.orders().products_by_ids(&cart.product_ids()).await?;
    let (lines, _) = build_lines(&cart, &products);

    let user = match intent.metadata_value("username") {
        Some(username) if username != ANONYMOUS_USERNAME => {
            state.orders().user_by_username(username).await?
        }
        _ => None,
    };

    let mut new_order = NewOrder::priced(
        intent.id.clone(),
        details,
        cart.raw.clone(),
        lines,
        &state.config().pricing,
    );
    new_order.user_id = user.as_ref().map(|u| u.id);
    if intent.status == "succeeded" {
        new_order.status = PaymentStatus::Paid;
    }

    let (order, created, newly_paid) = match state.orders().create_order(&new_order).await? {
        CreateOutcome::Created(order) => {
            let paid = order.is_paid;
            (order, true, paid)
        }
        CreateOutcome::Existing(existing) if new_order.status.is_paid() && !existing.is_paid => {
            match state.orders().mark_paid(&intent.id).await? {
                Some(update) => (update.order, false, update.newly_paid),
                None => (existing, false, false),
            }
        }
        CreateOutcome::Existing(existing) => (existing, false, false),
    };

    if newly_paid {
        // Whoever flips the order to paid sends the confirmation.
        let _ = state.webhooks().queue_confirmation(&order).await;
    }

    if created {
        state.catalog().invalidate_all().await;
        if let Some(user) = &user
            && intent.metadata_value("save_info") == Some("true")
        {
            state
                .orders()
                .save_default_delivery(user.id, &order.details)
                .await?;
        }
        info!(order_number = %order.order_number, status = %order.status, "Order recorded at checkout");
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CheckoutResponse {
            order_number: order.order_number.clone(),
            status: order.status,
            grand_total: order.grand_total,
            created,
        }),
    ))
}

/// Resolve cart entries against the catalog, rejecting unknown products and
/// quantities beyond stock.
async fn priced_lines(state: &AppState, cart: &ParsedCart) -> Result<Vec<NewOrderLine>, AppError> {
    let products = state.orders().products_by_ids(&cart.product_ids()).await?;
    let (lines, unknown) = build_lines(cart, &products);
    if unknown > 0 {
        return Err(AppError::BadRequest(
            "cart references products that no longer exist".to_string(),
        ));
    }

    for line in &lines {
        let stock = products
            .iter()
            .find(|p| p.id == line.product_id)
            .map_or(0, |p| p.stock);
        if line.quantity > stock {
            return Err(AppError::BadRequest(format!(
                "only {stock} left of product {}",
                line.product_id
            )));
        }
    }
    Ok(lines)
}

fn validate_details(mut details: DeliveryDetails) -> Result<DeliveryDetails, AppError> {
    details.full_name = details.full_name.trim().to_string();
    if details.full_name.is_empty() {
        return Err(AppError::BadRequest("full name is required".to_string()));
    }
    let email = Email::parse(details.email.trim())
        .map_err(|e| AppError::BadRequest(format!("invalid email: {e}")))?;
    details.email = email.as_str().to_string();
    Ok(details)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, header::CONTENT_TYPE},
        routing::post,
    };
    use tower::ServiceExt;

    use mercato_core::ProductId;

    use super::*;
    use crate::db::store::memory::MemoryOrderStore;
    use crate::models::Product;
    use crate::services::mail_queue::testing::RecordingMailer;
    use crate::state::testing;
    use crate::stripe::FakeGateway;

    fn product(id: i32, price: i64, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            sku: None,
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::new(price, 2),
            stock,
            image_key: None,
        }
    }

    fn app(store: Arc<MemoryOrderStore>, gateway: Arc<FakeGateway>) -> Router {
        app_with_mailer(store, gateway, Arc::new(RecordingMailer::default()))
    }

    fn app_with_mailer(
        store: Arc<MemoryOrderStore>,
        gateway: Arc<FakeGateway>,
        mailer: Arc<RecordingMailer>,
    ) -> Router {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(
            testing::config(dir.path().to_path_buf()),
            store,
            gateway,
            None,
            mailer,
        );
        Router::new()
            .route("/checkout/intent", post(create_intent))
            .route("/checkout", post(complete))
            .with_state(state)
    }

    async fn post_json(app: Router, uri: &str, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_intent_carries_cart_metadata() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 5)]));
        let gateway = Arc::new(FakeGateway::default());

        let (status, body) = post_json(
            app(store, gateway.clone()),
            "/checkout/intent",
            &serde_json::json!({"cart": {"1": 2}, "username": "ada", "save_info": true}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 2200);
        assert_eq!(body["client_secret"], "pi_fake1_secret_test");

        let created = gateway.created.lock().unwrap();
        let metadata = &created[0].metadata;
        assert!(metadata.contains(&("username".to_string(), "ada".to_string())));
        assert!(metadata.contains(&("save_info".to_string(), "true".to_string())));
        assert!(metadata.contains(&("cart".to_string(), r#"{"1":2}"#.to_string())));
    }

    #[tokio::test]
    async fn test_intent_rejects_bad_carts() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 1)]));
        let gateway = Arc::new(FakeGateway::default());

        for cart in [
            serde_json::json!({}),
            serde_json::json!({"1": 0}),
            serde_json::json!({"99": 1}),
            serde_json::json!({"1": 2}),
            serde_json::json!([1, 2]),
        ] {
            let (status, _) = post_json(
                app(store.clone(), gateway.clone()),
                "/checkout/intent",
                &serde_json::json!({ "cart": cart }),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "cart {cart}");
        }
        assert!(gateway.created.lock().unwrap().is_empty());
    }

    fn details_request(client_secret: &serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "client_secret": client_secret,
            "details": {
                "full_name": "Ada Lovelace",
                "email": "ada@example.com",
                "country": "GB",
                "town_or_city": "London",
                "street_address1": "12 St James's Square"
            }
        })
    }

    async fn start_checkout(store: &Arc<MemoryOrderStore>, gateway: &Arc<FakeGateway>) -> serde_json::Value {
        let (status, intent) = post_json(
            app(store.clone(), gateway.clone()),
            "/checkout/intent",
            &serde_json::json!({"cart": {"1": 2}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        intent
    }

    #[tokio::test]
    async fn test_complete_records_order_once() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 5)]));
        let gateway = Arc::new(FakeGateway::default());
        let mailer = Arc::new(RecordingMailer::default());

        let intent = start_checkout(&store, &gateway).await;
        gateway.set_status("pi_fake1", "succeeded");
        let request = details_request(&intent["client_secret"]);

        let (status, first) = post_json(
            app_with_mailer(store.clone(), gateway.clone(), mailer.clone()),
            "/checkout",
            &request,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["status"], "paid");

        let (status, second) = post_json(
            app_with_mailer(store.clone(), gateway, mailer.clone()),
            "/checkout",
            &request,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["order_number"], first["order_number"]);

        store.snapshot(|inner| {
            assert_eq!(inner.orders.len(), 1);
            assert_eq!(inner.items.len(), 1);
            assert_eq!(inner.products[&ProductId::new(1)].stock, 3);
        });

        for _ in 0..50 {
            if !mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_processing_intent_recorded_as_pending() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 5)]));
        let gateway = Arc::new(FakeGateway::default());

        let intent = start_checkout(&store, &gateway).await;
        gateway.set_status("pi_fake1", "processing");

        let (status, body) = post_json(
            app(store.clone(), gateway),
            "/checkout",
            &details_request(&intent["client_secret"]),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn test_complete_rejects_forged_client_secret() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 5)]));
        let gateway = Arc::new(FakeGateway::default());

        start_checkout(&store, &gateway).await;
        gateway.set_status("pi_fake1", "succeeded");

        // Same intent id, wrong secret.
        let (status, _) = post_json(
            app(store.clone(), gateway),
            "/checkout",
            &details_request(&serde_json::json!("pi_fake1_secret_FORGED")),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        store.snapshot(|inner| {
            assert!(inner.orders.is_empty());
            assert_eq!(inner.products[&ProductId::new(1)].stock, 5);
        });
    }

    #[tokio::test]
    async fn test_complete_rejects_unconfirmed_intent() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![product(1, 1000, 5)]));
        let gateway = Arc::new(FakeGateway::default());

        let intent = start_checkout(&store, &gateway).await;

        for unconfirmed in ["requires_payment_method", "requires_action", "canceled"] {
            gateway.set_status("pi_fake1", unconfirmed);
            let (status, _) = post_json(
                app(store.clone(), gateway.clone()),
                "/checkout",
                &details_request(&intent["client_secret"]),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "status {unconfirmed}");
        }

        store.snapshot(|inner| {
            assert!(inner.orders.is_empty());
            assert_eq!(inner.products[&ProductId::new(1)].stock, 5);
        });
    }

    #[tokio::test]
    async fn test_complete_validates_details() {
        let store = Arc::new(MemoryOrderStore::default());
        let gateway = Arc::new(FakeGateway::default());

        let (status, _) = post_json(
            app(store, gateway),
            "/checkout",
            &serde_json::json!({
                "client_secret": "pi_123_secret_abc",
                "details": { "full_name": "Ada", "email": "not-an-email" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
