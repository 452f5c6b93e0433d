//! Core types for Mercato.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod payment_intent;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use payment_intent::{PaymentIntentId, PaymentIntentIdError};
pub use price::{CurrencyCode, DeliveryPricing, Price};
pub use status::*;
