//! WebhookEventRepository port - event-level idempotency records.
//!
//! The processor delivers at least once: on timeouts, on any 5xx from this
//! service, and occasionally for no visible reason. Each event id is recorded
//! with the outcome of processing it.
//!
//! A record whose outcome is `Failed` does not block a retry; it is replaced
//! when the redelivery is processed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::domain::foundation::{DomainError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Success,
    Ignored,
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Success => "success",
            EventOutcome::Ignored => "ignored",
            EventOutcome::Failed => "failed",
        }
    }

    /// A redelivery of this event must not be processed again.
    pub fn is_final(&self) -> bool {
        !matches!(self, EventOutcome::Failed)
    }
}

impl FromStr for EventOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(EventOutcome::Success),
            "ignored" => Ok(EventOutcome::Ignored),
            "failed" => Ok(EventOutcome::Failed),
            other => Err(ValidationError::invalid_format(
                "result",
                format!("unknown webhook outcome '{}'", other),
            )),
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Processor event ID (evt_xxx format).
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
    pub outcome: EventOutcome,
    /// Reason for ignoring, or the failure message.
    pub detail: Option<String>,
    /// Original payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    fn with_outcome(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        outcome: EventOutcome,
        detail: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            outcome,
            detail,
            payload,
        }
    }

    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_outcome(event_id, event_type, EventOutcome::Success, None, payload)
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_outcome(
            event_id,
            event_type,
            EventOutcome::Ignored,
            Some(reason.into()),
            payload,
        )
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_outcome(
            event_id,
            event_type,
            EventOutcome::Failed,
            Some(error.into()),
            payload,
        )
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was written (new, or replacing a failed attempt).
    Inserted,
    /// A final record already exists; nothing written.
    AlreadyExists,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Inserts the record, or replaces an existing `Failed` record.
    ///
    /// Existing `Success`/`Ignored` records are kept.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Deletes records processed before `timestamp`, returning the count.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_record_has_no_detail() {
        let record = WebhookEventRecord::success(
            "evt_123",
            "checkout.session.completed",
            serde_json::json!({"id": "test"}),
        );
        assert_eq!(record.event_id, "evt_123");
        assert_eq!(record.outcome, EventOutcome::Success);
        assert!(record.detail.is_none());
    }

    #[test]
    fn ignored_record_includes_reason() {
        let record = WebhookEventRecord::ignored(
            "evt_456",
            "customer.created",
            "unhandled event type",
            serde_json::json!({}),
        );
        assert_eq!(record.outcome, EventOutcome::Ignored);
        assert_eq!(record.detail.as_deref(), Some("unhandled event type"));
    }

    #[test]
    fn only_failed_outcome_allows_reprocessing() {
        assert!(EventOutcome::Success.is_final());
        assert!(EventOutcome::Ignored.is_final());
        assert!(!EventOutcome::Failed.is_final());
    }

    #[test]
    fn outcome_round_trips_storage_string() {
        for outcome in [EventOutcome::Success, EventOutcome::Ignored, EventOutcome::Failed] {
            assert_eq!(outcome.as_str().parse::<EventOutcome>().unwrap(), outcome);
        }
    }
}
