//! PayoutHandler - `payout.paid` and `payout.failed` on connected accounts.

use std::sync::Arc;

use super::outcome::ReconciliationOutcome;
use crate::domain::foundation::Timestamp;
use crate::domain::payments::{Payout, WebhookError};
use crate::ports::{Notifier, PayeeDirectory, PayoutOutcome, PayoutRecord, SaveResult};

pub struct PayoutHandler {
    payees: Arc<dyn PayeeDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl PayoutHandler {
    pub fn new(payees: Arc<dyn PayeeDirectory>, notifier: Arc<dyn Notifier>) -> Self {
        Self { payees, notifier }
    }

    pub async fn handle(
        &self,
        payout: &Payout,
        account: Option<&str>,
        outcome: PayoutOutcome,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let account = account.ok_or(WebhookError::MissingField("account"))?;
        let Some(payee) = self.payees.find_by_connected_account(account).await? else {
            return Ok(ReconciliationOutcome::Ignored(format!(
                "no payee for connected account {}",
                account
            )));
        };

        let record = PayoutRecord {
            payout_id: payout.id.clone(),
            payee_id: payee.user_id,
            connected_account_id: account.to_string(),
            amount: payout.amount,
            currency: payout.currency.clone(),
            outcome,
            failure_message: payout
                .failure_message
                .clone()
                .or_else(|| payout.failure_code.clone()),
            arrival_date: payout.arrival_date.and_then(Timestamp::from_unix_secs),
        };

        if self.payees.record_payout(&record).await? == SaveResult::AlreadyExists {
            return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                "payout {} already recorded",
                payout.id
            )));
        }

        if let Err(e) = self.notifier.notify_payout(payee.user_id, &record).await {
            tracing::warn!(payout_id = %payout.id, error = %e, "payout notification failed");
        }
        tracing::info!(
            payout_id = %payout.id,
            payee_id = %payee.user_id,
            outcome = outcome.as_str(),
            amount = payout.amount,
            "payout recorded"
        );
        Ok(ReconciliationOutcome::PayoutRecorded {
            payout_id: payout.id.clone(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::memory::SentNotification;
    use crate::application::webhooks::test_support::*;
    use crate::application::webhooks::{ReconciliationOutcome, WebhookAck};
    use crate::ports::PayoutOutcome;
    use serde_json::json;

    fn payout_event(event_id: &str, event_type: &str, account: Option<&str>) -> serde_json::Value {
        let mut body = event(
            event_id,
            event_type,
            json!({
                "id": "po_1",
                "object": "payout",
                "amount": 42_000,
                "currency": "cad",
                "status": "paid",
                "arrival_date": 1_790_000_000,
            }),
        );
        if let Some(account) = account {
            body["account"] = json!(account);
        }
        body
    }

    #[tokio::test]
    async fn records_payout_once_and_notifies_payee() {
        let world = World::new().await;

        let first = world
            .deliver(&payout_event("evt_1", "payout.paid", Some(MANAGER_ACCOUNT)))
            .await
            .unwrap();
        let second = world
            .deliver(&payout_event("evt_2", "payout.paid", Some(MANAGER_ACCOUNT)))
            .await
            .unwrap();

        assert_eq!(
            first,
            WebhookAck::Processed(ReconciliationOutcome::PayoutRecorded {
                payout_id: "po_1".to_string(),
                outcome: PayoutOutcome::Paid,
            })
        );
        assert!(matches!(
            second,
            WebhookAck::Processed(ReconciliationOutcome::AlreadyApplied(_))
        ));

        let payouts = world.payees.payouts().await;
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].payee_id, MANAGER);
        assert_eq!(payouts[0].amount, 42_000);
        assert_eq!(
            world.notifier.sent().await,
            vec![SentNotification::Payout {
                payee_id: MANAGER,
                payout_id: "po_1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn bounced_payout_is_recorded_as_failed_and_payee_told() {
        let world = World::new().await;

        world
            .deliver(&payout_event("evt_1", "payout.paid", Some(MANAGER_ACCOUNT)))
            .await
            .unwrap();
        let bounced = world
            .deliver(&payout_event("evt_2", "payout.failed", Some(MANAGER_ACCOUNT)))
            .await
            .unwrap();
        let stale = world
            .deliver(&payout_event("evt_3", "payout.paid", Some(MANAGER_ACCOUNT)))
            .await
            .unwrap();

        assert_eq!(
            bounced,
            WebhookAck::Processed(ReconciliationOutcome::PayoutRecorded {
                payout_id: "po_1".to_string(),
                outcome: PayoutOutcome::Failed,
            })
        );
        assert!(matches!(
            stale,
            WebhookAck::Processed(ReconciliationOutcome::AlreadyApplied(_))
        ));

        let payouts = world.payees.payouts().await;
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].outcome, PayoutOutcome::Failed);
        let notices = world
            .notifier
            .sent()
            .await
            .into_iter()
            .filter(|n| matches!(n, SentNotification::Payout { .. }))
            .count();
        assert_eq!(notices, 2);
    }

    #[tokio::test]
    async fn payout_from_unknown_account_is_ignored() {
        let world = World::new().await;

        let ack = world
            .deliver(&payout_event("evt_1", "payout.failed", Some("acct_stranger")))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
        assert!(world.payees.payouts().await.is_empty());
    }

    #[tokio::test]
    async fn payout_without_account_is_dropped() {
        let world = World::new().await;

        let ack = world
            .deliver(&payout_event("evt_1", "payout.paid", None))
            .await
            .unwrap();

        assert!(matches!(ack, WebhookAck::Dropped(_)));
    }
}
