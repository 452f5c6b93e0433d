//! Mercato Core - Shared domain types.
//!
//! This crate provides the types shared by the Mercato components:
//! - `storefront` - Catalog, checkout and Stripe webhook service
//! - `cli` - Management commands (migrations, static collection)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices and delivery pricing, payment status,
//!   Stripe payment intent IDs and email addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
