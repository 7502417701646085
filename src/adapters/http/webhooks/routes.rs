//! Axum router configuration for webhook endpoints.

use axum::{routing::post, Router};

use super::handlers::{handle_stripe_webhook, manual_process_session, WebhookAppState};

/// Create the webhook router, mounted at `/webhooks`.
///
/// # Routes
///
/// - `POST /stripe` - Processor deliveries (signature verified)
/// - `POST /stripe/manual-process-session` - Re-run a checkout session
pub fn webhook_routes() -> Router<WebhookAppState> {
    Router::new()
        .route("/stripe", post(handle_stripe_webhook))
        .route(
            "/stripe/manual-process-session",
            post(manual_process_session),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::http::webhooks::handlers::{MANUAL_SECRET_HEADER, SIGNATURE_HEADER};
    use crate::adapters::rate_limiter::{InMemoryRateLimiter, WindowLimit};
    use crate::application::webhooks::test_support::*;
    use crate::domain::payments::{CheckoutSession, VerificationMode, WebhookVerifier};

    // ════════════════════════════════════════════════════════════════════════════
    // Fixture
    // ════════════════════════════════════════════════════════════════════════════

    fn state(world: &World, manual_secret: Option<&str>, production: bool, max_requests: u32) -> WebhookAppState {
        let verifier = WebhookVerifier::new(VerificationMode::Enforced(SecretString::new(
            SECRET.to_string(),
        )));
        WebhookAppState {
            router: Arc::new(world.services.router(verifier)),
            reprocessor: Arc::new(world.services.reprocessor()),
            rate_limiter: Arc::new(InMemoryRateLimiter::new(WindowLimit {
                max_requests,
                window_secs: 60,
            })),
            manual_secret: manual_secret.map(|s| Arc::new(SecretString::new(s.to_string()))),
            production,
        }
    }

    fn app(state: WebhookAppState) -> Router {
        Router::new()
            .nest("/webhooks", webhook_routes())
            .with_state(state)
    }

    fn delivery(body: &Value, signature: Option<String>) -> Request<Body> {
        let payload = serde_json::to_vec(body).unwrap();
        let signature = signature.unwrap_or_else(|| sign(&payload));
        Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(payload))
            .unwrap()
    }

    fn manual(session_id: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/stripe/manual-process-session")
            .header("Content-Type", "application/json")
            .header("X-Forwarded-For", "10.0.0.1");
        if let Some(secret) = secret {
            builder = builder.header(MANUAL_SECRET_HEADER, secret);
        }
        builder
            .body(Body::from(json!({ "sessionId": session_id }).to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn lost_session(world: &World) {
        let session: CheckoutSession =
            serde_json::from_value(paid_session("cs_lost", "pi_lost", kitchen_metadata())).unwrap();
        world.processor.add_checkout_session(session);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Processor Webhook
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn signed_delivery_is_acknowledged() {
        let world = World::new().await;
        let body = event(
            "evt_1",
            "checkout.session.completed",
            paid_session("cs_1", "pi_1", kitchen_metadata()),
        );

        let response = app(state(&world, None, false, 10))
            .oneshot(delivery(&body, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"received": true}));
        assert_eq!(world.store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_with_client_error() {
        let world = World::new().await;
        let body = event("evt_1", "payout.paid", json!({}));
        let forged = format!("t={},v1={}", chrono::Utc::now().timestamp(), "00".repeat(32));

        let response = app(state(&world, None, false, 10))
            .oneshot(delivery(&body, Some(forged)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["received"], json!(false));
        assert!(world.events.is_empty().await);
    }

    #[tokio::test]
    async fn retryable_failure_returns_server_error_without_details() {
        let world = World::new().await;
        world.ledger.set_unavailable(true);
        let body = event(
            "evt_1",
            "checkout.session.completed",
            paid_session("cs_1", "pi_1", kitchen_metadata()),
        );

        let response = app(state(&world, None, false, 10))
            .oneshot(delivery(&body, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({"received": false, "error": "processing failed"})
        );
    }

    #[tokio::test]
    async fn data_error_is_acknowledged() {
        let world = World::new().await;
        let body = event(
            "evt_1",
            "checkout.session.completed",
            paid_session("cs_1", "pi_1", json!({ "type": "kitchen_booking" })),
        );

        let response = app(state(&world, None, false, 10))
            .oneshot(delivery(&body, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(world.store.all().await.is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Manual Reprocessing
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn manual_reprocess_materializes_lost_session() {
        let world = World::new().await;
        lost_session(&world);

        let response = app(state(&world, Some("letmein"), true, 10))
            .oneshot(manual("cs_lost", Some("letmein")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["sessionId"], "cs_lost");
        assert_eq!(body["outcome"], "booking_materialized");
    }

    #[tokio::test]
    async fn manual_reprocess_requires_matching_secret() {
        let world = World::new().await;
        lost_session(&world);
        let app = app(state(&world, Some("letmein"), true, 10));

        let missing = app.clone().oneshot(manual("cs_lost", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app.oneshot(manual("cs_lost", Some("guess"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert!(world.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn production_without_secret_refuses_manual_reprocess() {
        let world = World::new().await;
        lost_session(&world);

        let response = app(state(&world, None, true, 10))
            .oneshot(manual("cs_lost", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn development_without_secret_allows_manual_reprocess() {
        let world = World::new().await;
        lost_session(&world);

        let response = app(state(&world, None, false, 10))
            .oneshot(manual("cs_lost", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let world = World::new().await;

        let response = app(state(&world, None, false, 10))
            .oneshot(manual("cs_missing", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error_code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn manual_reprocess_is_rate_limited_per_client() {
        let world = World::new().await;
        lost_session(&world);
        let app = app(state(&world, None, false, 1));

        let first = app.clone().oneshot(manual("cs_lost", None)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(manual("cs_lost", None)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("Retry-After"));
    }
}
