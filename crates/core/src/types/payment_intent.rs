//! Stripe payment intent identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PaymentIntentId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentIntentIdError {
    /// The input does not start with `pi_`.
    #[error("payment intent id must start with 'pi_'")]
    MissingPrefix,
    /// Nothing follows the prefix.
    #[error("payment intent id is empty after the prefix")]
    Empty,
    /// The id contains characters Stripe never emits.
    #[error("payment intent id contains invalid characters")]
    InvalidCharacters,
}

/// The id of a Stripe `PaymentIntent` (`pi_...`).
///
/// This is the reconciliation key between Stripe and local orders: at most
/// one order exists per payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentIntentId(String);

impl PaymentIntentId {
    const PREFIX: &'static str = "pi_";

    /// Parse a payment intent id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id lacks the `pi_` prefix, is empty after it,
    /// or contains anything other than ASCII alphanumerics and underscores.
    pub fn parse(s: &str) -> Result<Self, PaymentIntentIdError> {
        let rest = s
            .strip_prefix(Self::PREFIX)
            .ok_or(PaymentIntentIdError::MissingPrefix)?;
        if rest.is_empty() {
            return Err(PaymentIntentIdError::Empty);
        }
        if !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentIntentIdError::InvalidCharacters);
        }
        Ok(Self(s.to_owned()))
    }

    /// Extract the payment intent id from a client secret
    /// (`pi_123_secret_abc` becomes `pi_123`).
    ///
    /// # Errors
    ///
    /// Returns an error if the part before `_secret_` is not a valid id.
    pub fn from_client_secret(secret: &str) -> Result<Self, PaymentIntentIdError> {
        let id = secret.split("_secret").next().unwrap_or(secret);
        Self::parse(id)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentIntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PaymentIntentId {
    type Error = PaymentIntentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PaymentIntentId> for String {
    fn from(id: PaymentIntentId) -> Self {
        id.0
    }
}

impl std::str::FromStr for PaymentIntentId {
    type Err = PaymentIntentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
