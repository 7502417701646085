//! Event-level idempotency.
//!
//! The event record is a fast path: handlers stay idempotent on their own
//! keys (payment intent, extension session), so a record that could not be
//! read or written only costs a redundant pass, never a duplicate write.

use std::sync::Arc;

use crate::ports::{EventOutcome, WebhookEventRecord, WebhookEventRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Process,
    AlreadyProcessed(EventOutcome),
}

pub struct EventGuard {
    events: Arc<dyn WebhookEventRepository>,
}

impl EventGuard {
    pub fn new(events: Arc<dyn WebhookEventRepository>) -> Self {
        Self { events }
    }

    pub async fn check(&self, event_id: &str) -> GuardDecision {
        match self.events.find_by_event_id(event_id).await {
            Ok(Some(record)) if record.outcome.is_final() => {
                GuardDecision::AlreadyProcessed(record.outcome)
            }
            Ok(_) => GuardDecision::Process,
            Err(e) => {
                tracing::warn!(event_id, error = %e, "event record lookup failed, processing anyway");
                GuardDecision::Process
            }
        }
    }

    pub async fn record(&self, record: WebhookEventRecord) {
        let event_id = record.event_id.clone();
        let outcome = record.outcome;
        if let Err(e) = self.events.save(record).await {
            tracing::warn!(
                event_id = %event_id,
                outcome = outcome.as_str(),
                error = %e,
                "failed to record webhook event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryWebhookEventRepository;

    #[tokio::test]
    async fn failed_events_are_processed_again() {
        let repo = Arc::new(InMemoryWebhookEventRepository::new());
        let guard = EventGuard::new(repo.clone());

        guard
            .record(WebhookEventRecord::failed(
                "evt_1",
                "charge.refunded",
                "db down",
                serde_json::json!({}),
            ))
            .await;
        assert_eq!(guard.check("evt_1").await, GuardDecision::Process);

        guard
            .record(WebhookEventRecord::success(
                "evt_1",
                "charge.refunded",
                serde_json::json!({}),
            ))
            .await;
        assert_eq!(
            guard.check("evt_1").await,
            GuardDecision::AlreadyProcessed(EventOutcome::Success)
        );
    }

    #[tokio::test]
    async fn unseen_event_is_processed() {
        let guard = EventGuard::new(Arc::new(InMemoryWebhookEventRepository::new()));
        assert_eq!(guard.check("evt_new").await, GuardDecision::Process);
    }
}
