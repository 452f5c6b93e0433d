//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`].

pub mod order;
pub mod product;
pub mod user;

pub use order::{
    CreateOutcome, DeliveryDetails, NewOrder, NewOrderLine, Order, OrderItem, PaidUpdate,
    generate_order_number,
};
pub use product::Product;
pub use user::User;
