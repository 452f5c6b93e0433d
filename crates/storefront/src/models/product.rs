//! Catalog product.

use rust_decimal::Decimal;
use serde::Serialize;

use mercato_core::ProductId;

/// A product as sold in the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: Option<String>,
    pub name: String,
    pub description: String,
    /// Unit price in the store currency.
    pub price: Decimal,
    /// Units on hand. Never negative.
    pub stock: i32,
    /// Object key of the product image in media storage.
    pub image_key: Option<String>,
}

impl Product {
    /// Whether at least one unit is on hand.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}
