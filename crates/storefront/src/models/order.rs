//! Orders and their line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mercato_core::{
    DeliveryPricing, OrderId, OrderItemId, PaymentIntentId, PaymentStatus, ProductId, UserId,
};

/// Contact and delivery details captured for an order.
///
/// Filled from the checkout form, or recovered from Stripe objects when the
/// webhook has to rebuild an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub town_or_city: String,
    #[serde(default)]
    pub street_address1: String,
    #[serde(default)]
    pub street_address2: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
}

/// A persisted order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub details: DeliveryDetails,
    pub order_total: Decimal,
    pub delivery_cost: Decimal,
    pub grand_total: Decimal,
    /// Cart snapshot the order was built from, as carried in the intent metadata.
    pub original_cart: serde_json::Value,
    pub stripe_pid: PaymentIntentId,
    pub status: PaymentStatus,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// A persisted order line, with the product name for receipts.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    /// Product price at the time of purchase.
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// An order ready to be inserted together with its lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub details: DeliveryDetails,
    pub order_total: Decimal,
    pub delivery_cost: Decimal,
    pub grand_total: Decimal,
    pub original_cart: serde_json::Value,
    pub stripe_pid: PaymentIntentId,
    /// `Paid` when built by the webhook, `Pending` when built at checkout.
    pub status: PaymentStatus,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// A guest order in `Pending` state, priced from its lines.
    #[must_use]
    pub fn priced(
        stripe_pid: PaymentIntentId,
        details: DeliveryDetails,
        original_cart: serde_json::Value,
        lines: Vec<NewOrderLine>,
        pricing: &DeliveryPricing,
    ) -> Self {
        let order_total: Decimal = lines.iter().map(NewOrderLine::line_total).sum();
        Self {
            order_number: generate_order_number(),
            user_id: None,
            details,
            order_total,
            delivery_cost: pricing.delivery_cost(order_total),
            grand_total: pricing.grand_total(order_total),
            original_cart,
            stripe_pid,
            status: PaymentStatus::Pending,
            lines,
        }
    }
}

/// One line of a [`NewOrder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewOrderLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Result of inserting an order keyed by a payment intent.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The order and all of its lines were inserted.
    Created(Order),
    /// An order for the same payment intent already existed. Nothing was
    /// inserted or changed.
    Existing(Order),
}

impl CreateOutcome {
    /// The order, whichever way it came to exist.
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }
}

/// Result of marking the order for a payment intent as paid.
#[derive(Debug, Clone)]
pub struct PaidUpdate {
    pub order: Order,
    /// `true` only for the call that moved the order from unpaid to paid.
    pub newly_paid: bool,
}

/// Generate a new human-facing order number (32 uppercase hex digits).
#[must_use]
pub fn generate_order_number() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}
