//! Stripe REST API client.
//!
//! Covers the payment intent calls the checkout flow and the webhook
//! reconciliation need: create, and retrieve with expansion.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use mercato_core::PaymentIntentId;

use super::error::StripeError;
use super::types::{CreatePaymentIntent, PaymentIntent};

/// Payment intent operations, implemented by [`StripeClient`] and by
/// in-memory fakes in tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch a payment intent, expanding the given fields.
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
        expand: &[&str],
    ) -> Result<PaymentIntent, StripeError>;

    /// Create a payment intent.
    async fn create_payment_intent(
        &self,
        params: CreatePaymentIntent,
    ) -> Result<PaymentIntent, StripeError>;
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(secret_key: SecretString, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn intent_url(&self, id: Option<&PaymentIntentId>) -> String {
        match id {
            Some(id) => format!("{}/v1/payment_intents/{id}", self.api_base),
            None => format!("{}/v1/payment_intents", self.api_base),
        }
    }

    async fn parse_intent(response: Response, id: &str) -> Result<PaymentIntent, StripeError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| StripeError::Response(e.to_string()));
        }

        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|envelope| {
                envelope.error.message.or(envelope.error.error_type)
            })
            .unwrap_or_else(|| status.to_string());

        if status == StatusCode::NOT_FOUND {
            return Err(StripeError::NotFound(id.to_string()));
        }

        error!(status = %status, message = %message, "Stripe API error");
        Err(StripeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self), fields(payment_intent = %id))]
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
        expand: &[&str],
    ) -> Result<PaymentIntent, StripeError> {
        let mut url = url::Url::parse(&self.intent_url(Some(id)))
            .map_err(|e| StripeError::Request(e.to_string()))?;
        if !expand.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for field in expand {
                pairs.append_pair("expand[]", field);
            }
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let intent = Self::parse_intent(response, id.as_str()).await?;
        debug!(status = %intent.status, "Retrieved payment intent");
        Ok(intent)
    }

    #[instrument(skip(self, params), fields(amount = params.amount, currency = %params.currency))]
    async fn create_payment_intent(
        &self,
        params: CreatePaymentIntent,
    ) -> Result<PaymentIntent, StripeError> {
        let mut form = vec![
            ("amount".to_string(), params.amount.to_string()),
            ("currency".to_string(), params.currency),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        form.extend(
            params
                .metadata
                .into_iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value)),
        );

        let response = self
            .client
            .post(self.intent_url(None))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let intent = Self::parse_intent(response, "new payment intent").await?;
        debug!(payment_intent = %intent.id, "Created payment intent");
        Ok(intent)
    }
}
