//! Persistence seam for order reconciliation.

use async_trait::async_trait;
use sqlx::PgPool;

use mercato_core::{OrderId, PaymentIntentId, ProductId, UserId};

use super::{
    OrderRepository, ProductRepository, RepositoryError, UserRepository, WebhookEventRepository,
};
use crate::models::{
    CreateOutcome, DeliveryDetails, NewOrder, Order, OrderItem, PaidUpdate, Product, User,
};

/// Everything the checkout flow and the webhook handler read and write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_by_intent(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Insert an order unless one exists for its payment intent.
    async fn create_order(&self, order: &NewOrder) -> Result<CreateOutcome, RepositoryError>;

    /// Mark an order paid, reporting whether this call made the change.
    async fn mark_paid(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<PaidUpdate>, RepositoryError>;

    async fn mark_failed(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn save_default_delivery(
        &self,
        user_id: UserId,
        details: &DeliveryDetails,
    ) -> Result<(), RepositoryError>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, RepositoryError>;

    async fn record_event(&self, event_id: &str, event_type: &str)
    -> Result<bool, RepositoryError>;
}

/// [`OrderStore`] over the `PostgreSQL` repositories.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn order_by_intent(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .get_by_stripe_pid(stripe_pid)
            .await
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        OrderRepository::new(&self.pool).items(order_id).await
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).by_ids(ids).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<CreateOutcome, RepositoryError> {
        OrderRepository::new(&self.pool).create(order).await
    }

    async fn mark_paid(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<PaidUpdate>, RepositoryError> {
        OrderRepository::new(&self.pool).mark_paid(stripe_pid).await
    }

    async fn mark_failed(
        &self,
        stripe_pid: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).mark_failed(stripe_pid).await
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_username(username).await
    }

    async fn save_default_delivery(
        &self,
        user_id: UserId,
        details: &DeliveryDetails,
    ) -> Result<(), RepositoryError> {
        UserRepository::new(&self.pool)
            .save_default_delivery(user_id, details)
            .await
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, RepositoryError> {
        WebhookEventRepository::new(&self.pool)
            .is_processed(event_id)
            .await
    }

    async fn record_event(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, RepositoryError> {
        WebhookEventRepository::new(&self.pool)
            .record(event_id, event_type)
            .await
    }
}
