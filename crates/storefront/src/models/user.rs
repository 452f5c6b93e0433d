//! Shopper account.

use chrono::{DateTime, Utc};

use mercato_core::UserId;

/// A registered shopper.
///
/// Orders placed while logged in carry the username in the payment intent
/// metadata, which is how webhook-built orders find their owner.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
