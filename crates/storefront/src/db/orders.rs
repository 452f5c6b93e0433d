//! Order repository.
//!
//! Orders are keyed by their Stripe payment intent. Every insert goes through
//! [`OrderRepository::create`], which relies on the unique `stripe_pid`
//! constraint so that the checkout request and any number of concurrent
//! webhook deliveries produce exactly one order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use mercato_core::{
    OrderId, OrderItemId, PaymentIntentId, PaymentStatus, ProductId, UserId,
};

use super::RepositoryError;
use crate::models::{CreateOutcome, DeliveryDetails, NewOrder, Order, OrderItem, PaidUpdate};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_number: String,
    user_id: Option<i32>,
    full_name: String,
    email: String,
    phone_number: String,
    country: String,
    postcode: Option<String>,
    town_or_city: String,
    street_address1: String,
    street_address2: Option<String>,
    county: Option<String>,
    order_total: Decimal,
    delivery_cost: Decimal,
    grand_total: Decimal,
    original_cart: serde_json::Value,
    stripe_pid: String,
    status: String,
    is_paid: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let stripe_pid = PaymentIntentId::parse(&row.stripe_pid).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid stripe_pid in database: {e}"))
        })?;
        let status = row.status.parse::<PaymentStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid order status in database: {e}"))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            order_number: row.order_number,
            user_id: row.user_id.map(UserId::new),
            details: DeliveryDetails {
                full_name: row.full_name,
                email: row.email,
                phone_number: row.phone_number,
                country: row.country,
                postcode: row.postcode,
                town_or_city: row.town_or_city,
                street_address1: row.street_address1,
                street_address2: row.street_address2,
                county: row.county,
            },
            order_total: row.order_total,
            delivery_cost: row.delivery_cost,
            grand_total: row.grand_total,
            original_cart: row.original_cart,
            stripe_pid,
            status,
            is_paid: row.is_paid,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, full_name, email, phone_number, \
     country, postcode, town_or_city, street_address1, street_address2, county, \
     order_total, delivery_cost, grand_total, original_cart, stripe_pid, status, is_paid, \
     created_at";

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the order for a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_stripe_pid(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE stripe_pid = $1"
        ))
        .bind(stripe_pid.as_str())
        .fetch_optional(self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    /// Get an order by its public order number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails, or
    /// `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    /// Lines of an order with product names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name,
                   oi.quantity, oi.unit_price, oi.line_total
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            ",
        )
        .bind(order_id.as_i32())
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Insert an order with its lines, unless one already exists for the
    /// same payment intent.
    ///
    /// Runs in one transaction. When the insert wins, every line is inserted
    /// and each product's stock is reduced by the line quantity (never below
    /// zero). When an order for the intent already exists, nothing is
    /// inserted; if `order.status` is `Paid` the existing order is marked
    /// paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails, in which
    /// case nothing is committed.
    pub async fn create(&self, order: &NewOrder) -> Result<CreateOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (
                order_number, user_id, full_name, email, phone_number, country, postcode,
                town_or_city, street_address1, street_address2, county,
                order_total, delivery_cost, grand_total, original_cart, stripe_pid,
                status, is_paid
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (stripe_pid) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_id.map(|id| id.as_i32()))
        .bind(&order.details.full_name)
        .bind(&order.details.email)
        .bind(&order.details.phone_number)
        .bind(&order.details.country)
        .bind(&order.details.postcode)
        .bind(&order.details.town_or_city)
        .bind(&order.details.street_address1)
        .bind(&order.details.street_address2)
        .bind(&order.details.county)
        .bind(order.order_total)
        .bind(order.delivery_cost)
        .bind(order.grand_total)
        .bind(&order.original_cart)
        .bind(order.stripe_pid.as_str())
        .bind(order.status.as_str())
        .bind(order.status.is_paid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            let existing = select_by_intent(&mut tx, &order.stripe_pid).await?;
            tx.commit().await?;
            let row = existing.ok_or(RepositoryError::NotFound)?;
            return Ok(CreateOutcome::Existing(Order::try_from(row)?));
        };

        for line in &order.lines {
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(row.id)
            .bind(line.product_id.as_i32())
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_total())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE products SET stock = GREATEST(stock - $1, 0), updated_at = NOW() WHERE id = $2",
            )
            .bind(line.quantity)
            .bind(line.product_id.as_i32())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_number = %row.order_number,
            stripe_pid = %row.stripe_pid,
            lines = order.lines.len(),
            "Order created"
        );

        Ok(CreateOutcome::Created(Order::try_from(row)?))
    }

    /// Mark the order for a payment intent as paid.
    ///
    /// Only the call that flips an unpaid row reports `newly_paid`; later
    /// calls return the already-paid order unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_paid(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<PaidUpdate>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let flipped = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders SET status = 'paid', is_paid = TRUE, updated_at = NOW()
            WHERE stripe_pid = $1 AND NOT is_paid
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(stripe_pid.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let (row, newly_paid) = match flipped {
            Some(row) => (Some(row), true),
            None => (select_by_intent(&mut tx, stripe_pid).await?, false),
        };
        tx.commit().await?;

        row.map(|row| {
            Ok(PaidUpdate {
                order: Order::try_from(row)?,
                newly_paid,
            })
        })
        .transpose()
    }

    /// Mark the order for a payment intent as failed, unless it is already
    /// paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_failed(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders SET status = 'failed', updated_at = NOW()
            WHERE stripe_pid = $1 AND NOT is_paid
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(stripe_pid.as_str())
        .fetch_optional(self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }
}

async fn select_by_intent(
    tx: &mut Transaction<'_, Postgres>,
    stripe_pid: &PaymentIntentId,
) -> Result<Option<OrderRow>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE stripe_pid = $1"
    ))
    .bind(stripe_pid.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}
