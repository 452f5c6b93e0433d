//! `POST /stripe/webhook/`

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Header carrying Stripe's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receive a Stripe event.
///
/// 200 when the event was handled, acknowledged or already seen; 400 for a
/// bad signature or body (Stripe does not retry); 500 when handling failed
/// and the event should be redelivered.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.webhooks().process(&body, signature).await {
        Ok(reply) => {
            if reply.created {
                state.catalog().invalidate_all().await;
            }
            (StatusCode::OK, reply.message).into_response()
        }
        Err(e) if e.is_client_error() => {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            (StatusCode::BAD_REQUEST, format!("Webhook error: {e}")).into_response()
        }
        Err(e) => {
            let event_id = sentry::capture_error(&e);
            tracing::error!(error = %e, sentry_event_id = %event_id, "Webhook handling failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Webhook handling failed").into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
        routing::post,
    };
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use mercato_core::ProductId;

    use super::*;
    use crate::db::store::memory::MemoryOrderStore;
    use crate::models::Product;
    use crate::services::mail_queue::testing::RecordingMailer;
    use crate::state::testing;
    use crate::stripe::{FakeGateway, signature_header};

    fn app(store: Arc<MemoryOrderStore>, gateway: Arc<FakeGateway>) -> Router {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(
            testing::config(dir.path().to_path_buf()),
            store,
            gateway,
            None,
            Arc::new(RecordingMailer::default()),
        );
        Router::new()
            .route("/stripe/webhook/", post(stripe_webhook))
            .with_state(state)
    }

    async fn deliver(app: Router, body: Vec<u8>, signature: Option<String>) -> (StatusCode, String) {
        let mut request = Request::post("/stripe/webhook/");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = app.oneshot(request.body(Body::from(body)).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    fn event(id: &str, event_type: &str, object: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": id,
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn sign(body: &[u8]) -> String {
        signature_header(testing::WEBHOOK_SECRET, body, chrono::Utc::now().timestamp())
    }

    #[tokio::test]
    async fn test_unhandled_event_is_200() {
        let body = event("evt_1", "invoice.paid", &serde_json::json!({"id": "in_1"}));
        let signature = sign(&body);

        let (status, text) = deliver(
            app(Arc::default(), Arc::default()),
            body,
            Some(signature),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("invoice.paid"));
    }

    #[tokio::test]
    async fn test_bad_signature_is_400() {
        let body = event("evt_2", "invoice.paid", &serde_json::json!({}));

        let (status, _) = deliver(app(Arc::default(), Arc::default()), body.clone(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = deliver(
            app(Arc::default(), Arc::default()),
            body,
            Some("t=1,v1=deadbeef".to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_failure_is_500() {
        let body = event(
            "evt_3",
            "payment_intent.succeeded",
            &serde_json::json!({"id": "pi_missing"}),
        );
        let signature = sign(&body);

        // No order and the intent cannot be re-fetched.
        let (status, _) = deliver(
            app(Arc::default(), Arc::new(FakeGateway::unavailable())),
            body,
            Some(signature),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_order_built_from_metadata() {
        let store = Arc::new(MemoryOrderStore::with_products(vec![Product {
            id: ProductId::new(3),
            sku: Some("TEE-01".to_string()),
            name: "Tee".to_string(),
            description: String::new(),
            price: Decimal::new(1500, 2),
            stock: 4,
            image_key: None,
        }]));
        let gateway = Arc::new(FakeGateway::with_intent(
            serde_json::from_value(serde_json::json!({
                "id": "pi_route",
                "amount": 3300,
                "currency": "usd",
                "receipt_email": "grace@example.com",
                "metadata": { "cart": "{\"3\": 2, \"404\": 1}", "username": "AnonymousUser" }
            }))
            .unwrap(),
        ));
        let body = event(
            "evt_4",
            "payment_intent.succeeded",
            &serde_json::json!({"id": "pi_route"}),
        );
        let signature = sign(&body);

        let (status, text) = deliver(app(store.clone(), gateway), body, Some(signature)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Created order in webhook (1 items, 1 skipped)"));
        store.snapshot(|inner| {
            assert_eq!(inner.orders.len(), 1);
            assert_eq!(inner.orders[0].grand_total, Decimal::new(3300, 2));
            assert_eq!(inner.products[&ProductId::new(3)].stock, 2);
        });
    }
}
