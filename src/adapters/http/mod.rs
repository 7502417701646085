//! HTTP adapters - REST API implementations.

pub mod webhooks;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

pub use webhooks::{webhook_routes, WebhookAppState};

/// Complete application router.
///
/// ```ignore
/// let app = app_router(state).layer(TraceLayer::new_for_http());
/// axum::serve(listener, app).await?;
/// ```
pub fn app_router(state: WebhookAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_routes())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
