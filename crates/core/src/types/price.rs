//! Decimal prices and delivery charges.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Amount in the smallest currency unit, as Stripe expects it.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        (self.amount * Decimal::ONE_HUNDRED).round().to_i64()
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes accepted at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Lowercase code used by the Stripe API.
    #[must_use]
    pub const fn stripe_code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }

    /// Currency symbol for display.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// Delivery charge rules applied to every order.
///
/// Orders at or above the threshold ship free; below it, delivery costs a
/// percentage of the order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPricing {
    /// Order total at which delivery becomes free.
    pub free_delivery_threshold: Decimal,
    /// Delivery charge as a percentage of the order total.
    pub standard_delivery_percentage: Decimal,
}

impl Default for DeliveryPricing {
    fn default() -> Self {
        Self {
            free_delivery_threshold: Decimal::from(50),
            standard_delivery_percentage: Decimal::from(10),
        }
    }
}

impl DeliveryPricing {
    /// Delivery charge for an order total, rounded to 2 decimal places.
    #[must_use]
    pub fn delivery_cost(&self, order_total: Decimal) -> Decimal {
        if order_total >= self.free_delivery_threshold {
            return Decimal::ZERO;
        }
        (order_total * self.standard_delivery_percentage / Decimal::ONE_HUNDRED).round_dp(2)
    }

    /// Order total plus delivery.
    #[must_use]
    pub fn grand_total(&self, order_total: Decimal) -> Decimal {
        order_total + self.delivery_cost(order_total)
    }
}
