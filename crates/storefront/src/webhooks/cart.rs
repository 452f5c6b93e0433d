//! Cart snapshots carried in payment intent metadata.
//!
//! The checkout stores the cart as a JSON object mapping product ids to
//! quantities, e.g. `{"12": 2, "40": 1}`. Entries that cannot be turned
//! into an order line are skipped and counted rather than failing the whole
//! order.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use mercato_core::ProductId;

use crate::models::{NewOrderLine, Product};

/// The cart metadata is not a JSON object.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cart must be a JSON object of product id to quantity")]
    NotAnObject,
}

/// A cart parsed from metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCart {
    /// The cart as stored, for `orders.original_cart`.
    pub raw: Value,
    /// Entries with a numeric id and a positive quantity, in key order.
    pub entries: Vec<(ProductId, i32)>,
    /// Entries dropped for a non-numeric id or an unusable quantity.
    pub skipped: usize,
}

impl ParsedCart {
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }
}

/// Parse cart metadata.
///
/// # Errors
///
/// Returns `CartError` if the input is not a JSON object. Bad entries inside
/// a valid object are counted in [`ParsedCart::skipped`] instead.
pub fn parse_cart(raw: &str) -> Result<ParsedCart, CartError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(map) = &value else {
        return Err(CartError::NotAnObject);
    };

    let mut entries = Vec::with_capacity(map.len());
    let mut skipped = 0;
    for (key, quantity) in map {
        match (key.parse::<ProductId>(), quantity_of(quantity)) {
            (Ok(id), Some(quantity)) => entries.push((id, quantity)),
            _ => skipped += 1,
        }
    }

    Ok(ParsedCart {
        raw: value,
        entries,
        skipped,
    })
}

/// A positive quantity from a number, a numeric string, or a per-size map
/// (`{"items_by_size": {"m": 1, "l": 2}}`, summed).
fn quantity_of(value: &Value) -> Option<i32> {
    let quantity = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Object(map) => {
            let sizes = map.get("items_by_size")?.as_object()?;
            sizes
                .values()
                .map(|v| quantity_of(v).map(i64::from))
                .sum::<Option<i64>>()?
        }
        _ => return None,
    };
    i32::try_from(quantity).ok().filter(|q| *q > 0)
}

/// Order lines for the cart entries whose product exists.
///
/// Returns the lines and the number of entries skipped because the product
/// is unknown.
#[must_use]
pub fn build_lines(cart: &ParsedCart, products: &[Product]) -> (Vec<NewOrderLine>, usize) {
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let mut lines = Vec::with_capacity(cart.entries.len());
    let mut unknown = 0;

    for (id, quantity) in &cart.entries {
        match by_id.get(id) {
            Some(product) => lines.push(NewOrderLine {
                product_id: *id,
                quantity: *quantity,
                unit_price: product.price,
            }),
            None => {
                tracing::warn!(product_id = %id, "Cart references unknown product, skipping");
                unknown += 1;
            }
        }
    }
    (lines, unknown)
}

/// Sum of line totals.
#[must_use]
pub fn order_total(lines: &[NewOrderLine]) -> Decimal {
    lines.iter().map(NewOrderLine::line_total).sum()
}
