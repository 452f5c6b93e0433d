//! Stripe integration.
//!
//! - [`StripeClient`] - REST client for payment intents
//! - [`WebhookVerifier`] - `Stripe-Signature` verification and event parsing
//! - [`types`] - The subset of Stripe objects the storefront reads

mod client;
mod error;
mod signature;
pub mod types;

pub use client::{PaymentGateway, StripeClient};
pub use error::StripeError;
pub use signature::{DEFAULT_TOLERANCE_SECS, WebhookVerifier};
pub(crate) use signature::constant_time_compare;
pub use types::{CreatePaymentIntent, Event, PaymentIntent};

#[cfg(test)]
pub(crate) use signature::signature_header;
#[cfg(test)]
pub(crate) use client::testing::FakeGateway;
