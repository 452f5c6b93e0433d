//! Mercato storefront library.
//!
//! Catalog, checkout and Stripe webhook reconciliation over `PostgreSQL`,
//! media and static storage on S3 with a local fallback, Vite asset
//! resolution, and queued transactional email. The binary in `main.rs`
//! wires these together; the management CLI reuses the storage and
//! database layers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod retry;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod stripe;
pub mod webhooks;
