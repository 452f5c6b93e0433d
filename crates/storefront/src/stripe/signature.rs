//! Webhook signature verification.
//!
//! Stripe signs each delivery with HMAC-SHA256 over `"{timestamp}.{body}"`
//! and sends `Stripe-Signature: t=<timestamp>,v1=<hex>[,v1=<hex>...]`.
//! Several `v1` values appear while a signing secret is being rolled.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use super::error::StripeError;
use super::types::Event;

/// Maximum age of a signed delivery, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies webhook deliveries against the endpoint's signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Verify the signature header and parse the body as an event.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignature` if the header is malformed,
    /// stale, or does not match, and `StripeError::InvalidPayload` if a
    /// correctly signed body is not an event.
    pub fn construct_event(&self, payload: &[u8], header: &str) -> Result<Event, StripeError> {
        self.verify(payload, header, unix_now()?)?;
        serde_json::from_slice(payload).map_err(|e| StripeError::InvalidPayload(e.to_string()))
    }

    /// Verify a signature header as of `now` (seconds since the epoch).
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignature` on any mismatch.
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), StripeError> {
        let parsed = SignatureHeader::parse(header)?;

        if now.abs_diff(parsed.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(StripeError::InvalidSignature(
                "Timestamp outside the tolerance zone".to_string(),
            ));
        }

        let expected = sign(&self.secret, parsed.timestamp, payload)?;
        if !parsed
            .signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(StripeError::InvalidSignature(
                "No signatures found matching the expected signature".to_string(),
            ));
        }

        debug!("Stripe signature verified");
        Ok(())
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    fn parse(header: &'a str) -> Result<Self, StripeError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        StripeError::InvalidSignature("Invalid timestamp".to_string())
                    })?);
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            StripeError::InvalidSignature("Unable to extract timestamp from header".to_string())
        })?;
        if signatures.is_empty() {
            return Err(StripeError::InvalidSignature(
                "No v1 signatures found in header".to_string(),
            ));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
fn sign(secret: &SecretString, timestamp: i64, payload: &[u8]) -> Result<String, StripeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| StripeError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn unix_now() -> Result<i64, StripeError> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| StripeError::InvalidSignature(e.to_string()))?
        .as_secs();
    i64::try_from(secs).map_err(|_| StripeError::InvalidSignature("System time overflow".to_string()))
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Build a valid `Stripe-Signature` header for a payload.
#[cfg(test)]
pub(crate) fn signature_header(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signature = sign(&SecretString::from(secret), timestamp, payload).unwrap_or_default();
    format!("t={timestamp},v1={signature}")
}
