//! Stripe webhook processing.
//!
//! Deliveries are verified, deduplicated by event id, and dispatched on the
//! event type through [`DISPATCH`]. A successful payment either confirms the
//! order recorded at checkout or, when checkout never got that far, rebuilds
//! the order from the cart snapshot in the payment intent metadata.
//!
//! Handler errors surface as [`WebhookError`] so the endpoint can answer 500
//! and let Stripe redeliver. The event id is only recorded once a handler
//! has succeeded.

pub mod cart;
pub mod details;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use mercato_core::{CurrencyCode, DeliveryPricing, PaymentStatus, Price};

use crate::db::{OrderStore, RepositoryError};
use crate::models::{CreateOutcome, NewOrder, Order};
use crate::services::{DeliveryHandle, MailQueue, order_confirmation};
use crate::stripe::{Event, PaymentGateway, StripeError, WebhookVerifier};

pub use cart::{CartError, ParsedCart, build_lines, order_total, parse_cart};
pub use details::recover_details;

/// Fields expanded when re-fetching a payment intent to rebuild an order.
const EXPAND: &[&str] = &["latest_charge", "customer"];

/// Username recorded for shoppers who were not logged in at checkout.
const ANONYMOUS_USERNAME: &str = "AnonymousUser";

/// What to do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandler {
    PaymentSucceeded,
    PaymentFailed,
}

/// Event types with a dedicated handler. Everything else is acknowledged.
pub const DISPATCH: &[(&str, EventHandler)] = &[
    ("payment_intent.succeeded", EventHandler::PaymentSucceeded),
    ("payment_intent.payment_failed", EventHandler::PaymentFailed),
];

/// Look up the handler for an event type.
#[must_use]
pub fn handler_for(event_type: &str) -> Option<EventHandler> {
    DISPATCH
        .iter()
        .find(|(name, _)| *name == event_type)
        .map(|(_, handler)| *handler)
}

/// Errors from webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingSignature,

    #[error(transparent)]
    Signature(StripeError),

    #[error("invalid webhook payload: {0}")]
    Payload(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Stripe error: {0}")]
    Stripe(StripeError),
}

impl WebhookError {
    /// Whether the delivery itself is bad. Stripe should not retry these.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature | Self::Signature(_) | Self::Payload(_)
        )
    }
}

/// Outcome of a delivery that was accepted.
#[derive(Debug)]
pub struct WebhookReply {
    /// Body returned to Stripe.
    pub message: String,
    /// The order the event concerned, if any.
    pub order: Option<Order>,
    /// Whether this delivery inserted the order.
    pub created: bool,
    /// Completion of the confirmation email, when one was queued.
    pub delivery: Option<DeliveryHandle>,
}

impl WebhookReply {
    fn acknowledged(message: String) -> Self {
        Self {
            message,
            order: None,
            created: false,
            delivery: None,
        }
    }
}

/// Verifies, deduplicates and dispatches Stripe webhook deliveries.
#[derive(Clone)]
pub struct WebhookHandler {
    verifier: WebhookVerifier,
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    mail: MailQueue,
    pricing: DeliveryPricing,
    store_url: String,
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler")
            .field("verifier", &self.verifier)
            .field("pricing", &self.pricing)
            .field("store_url", &self.store_url)
            .finish_non_exhaustive()
    }
}

impl WebhookHandler {
    #[must_use]
    pub fn new(
        verifier: WebhookVerifier,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        mail: MailQueue,
        pricing: DeliveryPricing,
        store_url: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            store,
            gateway,
            mail,
            pricing,
            store_url: store_url.into(),
        }
    }

    /// Process one delivery.
    ///
    /// # Errors
    ///
    /// Client errors (see [`WebhookError::is_client_error`]) for a missing or
    /// bad signature or a malformed body; any other error means the event
    /// was not fully handled and should be redelivered.
    #[instrument(skip_all)]
    pub async fn process(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookReply, WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        let event = self
            .verifier
            .construct_event(payload, header)
            .map_err(|e| match e {
                StripeError::InvalidPayload(message) => WebhookError::Payload(message),
                other => WebhookError::Signature(other),
            })?;

        info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

        if self.store.is_event_processed(&event.id).await? {
            info!(event_id = %event.id, "Duplicate webhook event ignored");
            return Ok(WebhookReply::acknowledged(format!(
                "Webhook received: {} | duplicate event ignored",
                event.event_type
            )));
        }

        let Some(handler) = handler_for(&event.event_type) else {
            return Ok(WebhookReply::acknowledged(format!(
                "Unhandled webhook received: {}",
                event.event_type
            )));
        };

        let reply = match handler {
            EventHandler::PaymentSucceeded => self.payment_succeeded(&event).await?,
            EventHandler::PaymentFailed => self.payment_failed(&event).await?,
        };

        self.store.record_event(&event.id, &event.event_type).await?;
        Ok(reply)
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    async fn payment_succeeded(&self, event: &Event) -> Result<WebhookReply, WebhookError> {
        let event_type = &event.event_type;
        let intent = event
            .payment_intent()
            .map_err(|e| WebhookError::Payload(e.to_string()))?;

        if let Some(update) = self.store.mark_paid(&intent.id).await? {
            let order = update.order;
            info!(order_number = %order.order_number, payment_intent = %intent.id, newly_paid = update.newly_paid, "Verified order already in database");
            let delivery = if update.newly_paid {
                self.queue_confirmation(&order).await
            } else {
                None
            };
            return Ok(WebhookReply {
                message: format!(
                    "Webhook received: {event_type} | SUCCESS: Verified order already in database"
                ),
                order: Some(order),
                created: false,
                delivery,
            });
        }

        let intent = self
            .gateway
            .retrieve_payment_intent(&intent.id, EXPAND)
            .await
            .map_err(WebhookError::Stripe)?;

        let Some(raw_cart) = intent.metadata_value("cart") else {
            warn!(payment_intent = %intent.id, "Payment intent has no cart metadata, cannot create order");
            return Ok(WebhookReply::acknowledged(format!(
                "Webhook received: {event_type} | WARNING: No cart in payment intent metadata, order not created"
            )));
        };
        let cart = match parse_cart(raw_cart) {
            Ok(cart) => cart,
            Err(e) => {
                warn!(payment_intent = %intent.id, error = %e, "Unreadable cart metadata, cannot create order");
                return Ok(WebhookReply::acknowledged(format!(
                    "Webhook received: {event_type} | WARNING: Unreadable cart in payment intent metadata ({e}), order not created"
                )));
            }
        };

        let products = self.store.products_by_ids(&cart.product_ids()).await?;
        let (lines, unknown) = build_lines(&cart, &products);
        let skipped = cart.skipped + unknown;

        let user = match intent.metadata_value("username") {
            Some(username) if username != ANONYMOUS_USERNAME => {
                let user = self.store.user_by_username(username).await?;
                if user.is_none() {
                    warn!(username, "Unknown username in payment intent metadata, creating guest order");
                }
                user
            }
            _ => None,
        };

        let mut new_order = NewOrder::priced(
            intent.id.clone(),
            recover_details(&intent),
            cart.raw.clone(),
            lines,
            &self.pricing,
        );
        new_order.user_id = user.as_ref().map(|u| u.id);
        new_order.status = PaymentStatus::Paid;

        if let Ok(currency) = intent.currency.parse::<CurrencyCode>()
            && Price::new(new_order.grand_total, currency).minor_units() != Some(intent.amount)
        {
            warn!(
                payment_intent = %intent.id,
                charged = intent.amount,
                rebuilt = %new_order.grand_total,
                "Rebuilt order total differs from the amount charged"
            );
        }

        let order = match self.store.create_order(&new_order).await? {
            CreateOutcome::Existing(existing) => {
                // Checkout may have inserted it as pending in the meantime.
                let (order, newly_paid) = match self.store.mark_paid(&intent.id).await? {
                    Some(update) => (update.order, update.newly_paid),
                    None => (existing, false),
                };
                info!(order_number = %order.order_number, newly_paid, "Order created concurrently, verified instead");
                let delivery = if newly_paid {
                    self.queue_confirmation(&order).await
                } else {
                    None
                };
                return Ok(WebhookReply {
                    message: format!(
                        "Webhook received: {event_type} | SUCCESS: Verified order already in database"
                    ),
                    order: Some(order),
                    created: false,
                    delivery,
                });
            }
            CreateOutcome::Created(order) => order,
        };

        if let Some(user) = &user
            && intent.metadata_value("save_info") == Some("true")
        {
            self.store
                .save_default_delivery(user.id, &order.details)
                .await?;
        }

        info!(
            order_number = %order.order_number,
            items = new_order.lines.len(),
            skipped,
            "Created order in webhook"
        );
        let delivery = self.queue_confirmation(&order).await;

        Ok(WebhookReply {
            message: format!(
                "Webhook received: {event_type} | SUCCESS: Created order in webhook ({} items, {skipped} skipped)",
                new_order.lines.len()
            ),
            order: Some(order),
            created: true,
            delivery,
        })
    }

    #[instrument(skip_all, fields(event_id = %event.id))]
    async fn payment_failed(&self, event: &Event) -> Result<WebhookReply, WebhookError> {
        let intent = event
            .payment_intent()
            .map_err(|e| WebhookError::Payload(e.to_string()))?;
        let reason = intent
            .last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .unwrap_or("unknown");

        let order = self.store.mark_failed(&intent.id).await?;
        match &order {
            Some(order) => {
                warn!(order_number = %order.order_number, reason, "Payment failed, order marked failed");
            }
            None => info!(payment_intent = %intent.id, reason, "Payment failed, no unpaid order to update"),
        }

        Ok(WebhookReply {
            message: format!("Webhook received: {}", event.event_type),
            order,
            created: false,
            delivery: None,
        })
    }

    /// Queue the confirmation email. Failures are logged: the order stands
    /// whether or not the email goes out.
    /// Queue the order-confirmation e-mail. Failures are logged, never
    /// returned: the order is already recorded.
    pub(crate) async fn queue_confirmation(&self, order: &Order) -> Option<DeliveryHandle> {
        if order.details.email.is_empty() {
            warn!(order_number = %order.order_number, "No email address for order, confirmation not sent");
            return None;
        }

        let items = match self.store.order_items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(order_number = %order.order_number, error = %e, "Could not load order items for confirmation");
                return None;
            }
        };

        match order_confirmation(order, &items, &self.store_url)
            .and_then(|message| self.mail.enqueue(message))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(order_number = %order.order_number, error = %e, "Could not queue confirmation email");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::{Value, json};

    use mercato_core::{PaymentIntentId, ProductId, UserId};

    use super::*;
    use crate::db::store::memory::MemoryOrderStore;
    use crate::models::{DeliveryDetails, NewOrderLine, Product, generate_order_number};
    use crate::retry::RetryPolicy;
    use crate::services::mail_queue::testing::RecordingMailer;
    use crate::stripe::{FakeGateway, PaymentIntent, signature_header};

    const SECRET: &str = "whsec_test";

    struct Harness {
        handler: WebhookHandler,
        store: Arc<MemoryOrderStore>,
        gateway: Arc<FakeGateway>,
        mailer: Arc<RecordingMailer>,
    }

    fn product(id: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            sku: None,
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::new(price, 2),
            stock: 10,
            image_key: None,
        }
    }

    fn harness_with(store: MemoryOrderStore, gateway: FakeGateway) -> Harness {
        let store = Arc::new(store);
        let gateway = Arc::new(gateway);
        let mailer = Arc::new(RecordingMailer::default());
        let (mail, _worker) = MailQueue::start(mailer.clone(), RetryPolicy::immediate(1), 8);
        let handler = WebhookHandler::new(
            WebhookVerifier::new(SecretString::from(SECRET)),
            store.clone(),
            gateway.clone(),
            mail,
            DeliveryPricing::default(),
            "https://shop.example.com",
        );
        Harness {
            handler,
            store,
            gateway,
            mailer,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MemoryOrderStore::with_products(vec![product(1, 1000), product(2, 550)]),
            FakeGateway::default(),
        )
    }

    fn intent(value: Value) -> PaymentIntent {
        serde_json::from_value(value).unwrap()
    }

    fn full_intent(id: &str, cart: &str, username: &str) -> PaymentIntent {
        intent(json!({
            "id": id,
            "amount": 2805,
            "currency": "usd",
            "status": "succeeded",
            "receipt_email": "ada@example.com",
            "metadata": { "cart": cart, "username": username, "save_info": "true" },
            "shipping": {
                "name": "Ada Lovelace",
                "phone": "+44 20 7946 0000",
                "address": { "line1": "12 St James's Square", "city": "London", "country": "GB" }
            }
        }))
    }

    fn payload(event_id: &str, event_type: &str, object: &Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": event_type,
            "created": 1_700_000_000,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn signed(payload: &[u8]) -> String {
        signature_header(SECRET, payload, chrono::Utc::now().timestamp())
    }

    async fn deliver(h: &Harness, payload: &[u8]) -> Result<WebhookReply, WebhookError> {
        h.handler.process(payload, Some(&signed(payload))).await
    }

    async fn seed_pending_order(store: &MemoryOrderStore, id: &str) -> Order {
        let outcome = store
            .create_order(&NewOrder {
                order_number: generate_order_number(),
                user_id: None,
                details: DeliveryDetails {
                    full_name: "Ada Lovelace".to_string(),
                    email: "ada@example.com".to_string(),
                    ..DeliveryDetails::default()
                },
                order_total: Decimal::new(1000, 2),
                delivery_cost: Decimal::new(100, 2),
                grand_total: Decimal::new(1100, 2),
                original_cart: json!({"1": 1}),
                stripe_pid: PaymentIntentId::parse(id).unwrap(),
                status: PaymentStatus::Pending,
                lines: vec![NewOrderLine {
                    product_id: ProductId::new(1),
                    quantity: 1,
                    unit_price: Decimal::new(1000, 2),
                }],
            })
            .await
            .unwrap();
        outcome.order().clone()
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(
            handler_for("payment_intent.succeeded"),
            Some(EventHandler::PaymentSucceeded)
        );
        assert_eq!(
            handler_for("payment_intent.payment_failed"),
            Some(EventHandler::PaymentFailed)
        );
        assert_eq!(handler_for("charge.refunded"), None);
    }

    #[tokio::test]
    async fn test_unhandled_event_acknowledged_with_type() {
        let h = harness();
        let body = payload("evt_1", "customer.created", &json!({"id": "cus_1"}));

        let reply = deliver(&h, &body).await.unwrap();

        assert_eq!(reply.message, "Unhandled webhook received: customer.created");
        assert!(reply.order.is_none());
    }

    #[tokio::test]
    async fn test_existing_order_marked_paid() {
        let h = harness();
        let pending = seed_pending_order(&h.store, "pi_existing").await;
        assert!(!pending.is_paid);

        let body = payload(
            "evt_2",
            "payment_intent.succeeded",
            &json!({"id": "pi_existing", "metadata": {}}),
        );
        let reply = deliver(&h, &body).await.unwrap();

        assert_eq!(
            reply.message,
            "Webhook received: payment_intent.succeeded | SUCCESS: Verified order already in database"
        );
        assert!(!reply.created);
        assert_eq!(h.gateway.retrievals(), 0);
        h.store.snapshot(|inner| {
            assert_eq!(inner.orders.len(), 1);
            assert_eq!(inner.items.len(), 1);
            assert_eq!(inner.orders[0].status, PaymentStatus::Paid);
            assert!(inner.orders[0].is_paid);
        });

        let report = reply.delivery.unwrap().outcome().await;
        assert!(report.is_delivered());
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_rebuilt_from_metadata() {
        let h = harness();
        h.store.add_user(7, "ada");
        h.gateway
            .insert(full_intent("pi_new", r#"{"1": 2, "2": 1, "999": 1}"#, "ada"));

        let body = payload(
            "evt_3",
            "payment_intent.succeeded",
            &json!({"id": "pi_new", "metadata": {}}),
        );
        let reply = deliver(&h, &body).await.unwrap();

        assert!(reply.created);
        assert!(reply.message.contains("SUCCESS: Created order in webhook"));
        assert!(reply.message.contains("(2 items, 1 skipped)"));
        assert_eq!(h.gateway.retrievals(), 1);

        let order = reply.order.clone().unwrap();
        assert_eq!(order.user_id, Some(UserId::new(7)));
        assert_eq!(order.status, PaymentStatus::Paid);
        assert_eq!(order.order_total, Decimal::new(2550, 2));
        assert_eq!(order.delivery_cost, Decimal::new(255, 2));
        assert_eq!(order.grand_total, Decimal::new(2805, 2));
        assert_eq!(order.details.full_name, "Ada Lovelace");
        assert_eq!(order.details.email, "ada@example.com");

        h.store.snapshot(|inner| {
            assert_eq!(inner.orders.len(), 1);
            assert_eq!(inner.items.len(), 2);
            assert_eq!(inner.products[&ProductId::new(1)].stock, 8);
            assert_eq!(inner.products[&ProductId::new(2)].stock, 9);
            assert_eq!(
                inner.profiles[&UserId::new(7)].street_address1,
                "12 St James's Square"
            );
            assert!(inner.events.contains("evt_3"));
        });

        assert!(reply.delivery.unwrap().outcome().await.is_delivered());
        assert_eq!(h.mailer.sent()[0].to, "ada@example.com");
    }

    #[tokio::test]
    async fn test_cart_without_username_is_guest_order() {
        let h = harness();
        h.gateway
            .insert(full_intent("pi_guest", r#"{"1": 1}"#, "AnonymousUser"));

        let body = payload(
            "evt_4",
            "payment_intent.succeeded",
            &json!({"id": "pi_guest"}),
        );
        let reply = deliver(&h, &body).await.unwrap();

        assert!(reply.created);
        assert_eq!(reply.order.unwrap().user_id, None);
        h.store.snapshot(|inner| assert!(inner.profiles.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_cart_creates_nothing() {
        let h = harness();
        h.gateway.insert(intent(json!({
            "id": "pi_nocart",
            "metadata": { "username": "ada" }
        })));

        let body = payload(
            "evt_5",
            "payment_intent.succeeded",
            &json!({"id": "pi_nocart"}),
        );
        let reply = deliver(&h, &body).await.unwrap();

        assert!(!reply.created);
        assert!(reply.message.contains("order not created"));
        h.store.snapshot(|inner| assert!(inner.orders.is_empty()));
    }

    #[tokio::test]
    async fn test_duplicate_event_ignored() {
        let h = harness();
        h.gateway
            .insert(full_intent("pi_dup", r#"{"1": 1}"#, ""));
        let body = payload(
            "evt_6",
            "payment_intent.succeeded",
            &json!({"id": "pi_dup"}),
        );

        deliver(&h, &body).await.unwrap();
        let second = deliver(&h, &body).await.unwrap();

        assert!(second.message.ends_with("duplicate event ignored"));
        assert_eq!(h.gateway.retrievals(), 1);
        h.store.snapshot(|inner| assert_eq!(inner.orders.len(), 1));
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_create_one_order() {
        let h = harness();
        h.gateway
            .insert(full_intent("pi_race", r#"{"1": 3}"#, ""));
        let first = payload("evt_a", "payment_intent.succeeded", &json!({"id": "pi_race"}));
        let second = payload("evt_b", "payment_intent.succeeded", &json!({"id": "pi_race"}));

        let (a, b) = tokio::join!(deliver(&h, &first), deliver(&h, &second));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(u8::from(a.created) + u8::from(b.created), 1);
        h.store.snapshot(|inner| {
            assert_eq!(inner.orders.len(), 1);
            assert_eq!(inner.items.len(), 1);
            assert_eq!(inner.products[&ProductId::new(1)].stock, 7);
        });

        for delivery in [a.delivery, b.delivery].into_iter().flatten() {
            assert!(delivery.outcome().await.is_delivered());
        }
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_of_paid_order_sends_no_second_email() {
        let h = harness();
        seed_pending_order(&h.store, "pi_twice").await;

        let first = payload("evt_c", "payment_intent.succeeded", &json!({"id": "pi_twice"}));
        let reply = deliver(&h, &first).await.unwrap();
        assert!(reply.delivery.unwrap().outcome().await.is_delivered());

        // Stripe retries with a fresh event id after a lost acknowledgement.
        let second = payload("evt_d", "payment_intent.succeeded", &json!({"id": "pi_twice"}));
        let reply = deliver(&h, &second).await.unwrap();

        assert!(reply.message.ends_with("SUCCESS: Verified order already in database"));
        assert!(reply.delivery.is_none());
        assert_eq!(reply.order.unwrap().status, PaymentStatus::Paid);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_failed_marks_order() {
        let h = harness();
        seed_pending_order(&h.store, "pi_declined").await;

        let body = payload(
            "evt_7",
            "payment_intent.payment_failed",
            &json!({
                "id": "pi_declined",
                "last_payment_error": { "code": "card_declined", "message": "Your card was declined." }
            }),
        );
        let reply = deliver(&h, &body).await.unwrap();

        assert_eq!(reply.message, "Webhook received: payment_intent.payment_failed");
        assert_eq!(reply.order.unwrap().status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_signature_failures_are_client_errors() {
        let h = harness();
        let body = payload("evt_8", "customer.created", &json!({}));

        let missing = h.handler.process(&body, None).await.unwrap_err();
        assert!(matches!(missing, WebhookError::MissingSignature));

        let forged = signature_header("whsec_other", &body, chrono::Utc::now().timestamp());
        let bad = h.handler.process(&body, Some(&forged)).await.unwrap_err();
        assert!(matches!(bad, WebhookError::Signature(_)));
        assert!(bad.is_client_error());

        let garbage = b"not json";
        let err = deliver(&h, garbage).await.unwrap_err();
        assert!(matches!(err, WebhookError::Payload(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error_and_not_recorded() {
        let h = harness_with(MemoryOrderStore::failing(), FakeGateway::default());
        let body = payload(
            "evt_9",
            "payment_intent.succeeded",
            &json!({"id": "pi_x"}),
        );

        let err = deliver(&h, &body).await.unwrap_err();

        assert!(matches!(err, WebhookError::Repository(_)));
        assert!(!err.is_client_error());
        h.store.snapshot(|inner| assert!(inner.events.is_empty()));
    }

    #[tokio::test]
    async fn test_stripe_failure_is_server_error() {
        let h = harness_with(MemoryOrderStore::default(), FakeGateway::unavailable());
        let body = payload(
            "evt_10",
            "payment_intent.succeeded",
            &json!({"id": "pi_y"}),
        );

        let err = deliver(&h, &body).await.unwrap_err();

        assert!(matches!(err, WebhookError::Stripe(_)));
        assert!(!err.is_client_error());
    }
}
