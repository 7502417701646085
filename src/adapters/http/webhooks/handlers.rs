//! HTTP handlers for the webhook endpoints.
//!
//! The processor endpoint hands raw body bytes to the `WebhookRouter`; the
//! body is never re-encoded before verification.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use crate::application::webhooks::{ReprocessCheckoutSession, ReprocessError, WebhookRouter};
use crate::domain::payments::{constant_time_compare, WebhookError};
use crate::ports::{RateLimitKey, RateLimitResult, RateLimiter};

use super::dto::{
    ErrorResponse, EventPeek, ManualProcessRequest, ManualProcessResponse, WebhookReceipt,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const MANUAL_SECRET_HEADER: &str = "X-Manual-Process-Secret";
const MANUAL_PROCESS_RESOURCE: &str = "manual_process";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the webhook endpoints.
#[derive(Clone)]
pub struct WebhookAppState {
    pub router: Arc<WebhookRouter>,
    pub reprocessor: Arc<ReprocessCheckoutSession>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub manual_secret: Option<Arc<SecretString>>,
    pub production: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Processor Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// Handle `POST /webhooks/stripe`.
pub async fn handle_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peek: EventPeek = serde_json::from_slice(&body).unwrap_or_default();
    let span = tracing::info_span!(
        "stripe_webhook",
        event_id = peek.id.as_deref().unwrap_or("unknown"),
        event_type = peek.event_type.as_deref().unwrap_or("unknown"),
    );

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let result = state.router.handle(&body, signature).instrument(span).await;

    match result {
        Ok(ack) => {
            tracing::debug!(ack = ?ack, "webhook acknowledged");
            (StatusCode::OK, Json(WebhookReceipt::received())).into_response()
        }
        Err(err) => WebhookApiError(err).into_response(),
    }
}

/// Maps a `WebhookError` onto the processor-facing response.
pub struct WebhookApiError(pub WebhookError);

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = if status.is_success() {
            WebhookReceipt::received()
        } else if status.is_server_error() {
            // Internals stay in the logs
            WebhookReceipt::rejected("processing failed")
        } else {
            WebhookReceipt::rejected(self.0.to_string())
        };
        (status, Json(body)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Manual Reprocessing
// ════════════════════════════════════════════════════════════════════════════════

/// Handle `POST /webhooks/stripe/manual-process-session`.
pub async fn manual_process_session(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    Json(request): Json<ManualProcessRequest>,
) -> Result<Json<ManualProcessResponse>, ApiError> {
    let client_ip = client_ip(&headers);
    let key = RateLimitKey::ip(&client_ip, MANUAL_PROCESS_RESOURCE);
    match state.rate_limiter.check(&key).await {
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::warn!(client_ip = %client_ip, "manual reprocessing rate limited");
            return Err(ApiError::RateLimited {
                retry_after_secs: denied.retry_after_secs,
            });
        }
        Ok(RateLimitResult::Allowed(_)) => {}
        Err(e) => {
            // Fail open
            tracing::warn!(error = %e, "rate limiter unavailable");
        }
    }

    authorize_manual(&state, &headers)?;

    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest("sessionId is required".to_string()));
    }

    let outcome = state.reprocessor.reprocess(session_id).await?;
    Ok(Json(ManualProcessResponse {
        session_id: session_id.to_string(),
        outcome: outcome.kind().to_string(),
    }))
}

/// A configured secret is always enforced; production refuses to run
/// without one.
fn authorize_manual(state: &WebhookAppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = match (&state.manual_secret, state.production) {
        (Some(secret), _) => secret,
        (None, true) => {
            tracing::error!("manual reprocessing requested but no secret is configured");
            return Err(ApiError::Forbidden(
                "manual reprocessing is not configured".to_string(),
            ));
        }
        (None, false) => return Ok(()),
    };

    let provided = headers
        .get(MANUAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if constant_time_compare(provided.as_bytes(), expected.expose_secret().as_bytes()) {
        Ok(())
    } else {
        tracing::warn!("manual reprocessing secret mismatch");
        Err(ApiError::Unauthorized)
    }
}

/// First `X-Forwarded-For` entry, else `unknown`.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Errors of the administrative endpoint.
#[derive(Debug)]
pub enum ApiError {
    RateLimited { retry_after_secs: u32 },
    Unauthorized,
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal,
}

impl From<ReprocessError> for ApiError {
    fn from(err: ReprocessError) -> Self {
        match err {
            ReprocessError::SessionNotFound(id) => {
                ApiError::NotFound(format!("checkout session {} not found", id))
            }
            ReprocessError::Webhook(e) if e.is_retryable() => {
                tracing::error!(error = %e, "manual reprocessing failed");
                ApiError::Internal
            }
            ReprocessError::Webhook(e) => ApiError::Unprocessable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::RateLimited { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorResponse::new(
                        "RATE_LIMIT_EXCEEDED",
                        "Rate limit exceeded",
                    )),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert("Retry-After", HeaderValue::from(retry_after_secs));
                return response;
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid manual process secret".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_SESSION", msg)
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Reprocessing failed".to_string(),
            ),
        };
        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}
