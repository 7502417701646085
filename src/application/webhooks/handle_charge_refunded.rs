//! ChargeRefundedHandler - `charge.refunded`.
//!
//! The charge reports its cumulative refunded amount, so the stored refund
//! total is overwritten, never incremented. A delivery reporting less than
//! what is stored is stale and dropped.

use std::sync::Arc;

use super::outcome::ReconciliationOutcome;
use super::status_sync::StatusSynchronizer;
use crate::domain::foundation::Timestamp;
use crate::domain::payments::{
    Charge, RefundAssessment, RefundDecision, TransactionPatch, WebhookError,
};
use crate::ports::TransactionLedger;

pub struct ChargeRefundedHandler {
    ledger: Arc<dyn TransactionLedger>,
    sync: Arc<StatusSynchronizer>,
}

impl ChargeRefundedHandler {
    pub fn new(ledger: Arc<dyn TransactionLedger>, sync: Arc<StatusSynchronizer>) -> Self {
        Self { ledger, sync }
    }

    pub async fn handle(
        &self,
        charge: &Charge,
        event_id: &str,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let intent = charge
            .payment_intent_id()
            .ok_or(WebhookError::MissingField("payment_intent"))?;

        // Refunds can outrun the success event; a retry finds the row
        let tx = self
            .ledger
            .find_by_payment_intent(intent)
            .await?
            .ok_or_else(|| WebhookError::TransactionNotFound(intent.to_string()))?;

        let Some(assessment) = RefundAssessment::from_charge(charge.amount, charge.amount_refunded)
        else {
            return Ok(ReconciliationOutcome::Ignored(format!(
                "charge {} reports no refunded amount",
                charge.id
            )));
        };

        match tx.refund_decision(&assessment) {
            RefundDecision::Apply => {}
            RefundDecision::AlreadyApplied => {
                return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                    "refund total {} already recorded on transaction {}",
                    assessment.refund_amount, tx.id
                )));
            }
            RefundDecision::Stale => {
                tracing::info!(
                    transaction_id = %tx.id,
                    stored = tx.refund_amount,
                    reported = assessment.refund_amount,
                    "dropping stale refund"
                );
                return Ok(ReconciliationOutcome::Ignored(format!(
                    "refund total {} is below recorded {}",
                    assessment.refund_amount, tx.refund_amount
                )));
            }
            RefundDecision::Refused => {
                return Err(WebhookError::InvalidTransition(format!(
                    "transaction {} cannot move from {} to {}",
                    tx.id, tx.status, assessment.status
                )));
            }
        }

        let latest = charge.latest_refund();
        let patch = TransactionPatch {
            refund_amount: Some(assessment.refund_amount),
            status: Some(assessment.status),
            charge_id: Some(charge.id.clone()),
            refund_id: latest.map(|r| r.id.clone()),
            refund_reason: latest.and_then(|r| r.reason.clone()),
            processor_status: Some(assessment.status.as_str().to_string()),
            webhook_event_id: Some(event_id.to_string()),
            refunded_at: Some(Timestamp::now()),
            ..Default::default()
        };

        let Some(updated) = self
            .ledger
            .update_if_status(tx.id, &[tx.status], &patch)
            .await?
        else {
            return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                "transaction {} changed concurrently",
                tx.id
            )));
        };

        self.sync
            .sync(intent, assessment.status.payment_status())
            .await?;

        tracing::info!(
            transaction_id = %updated.id,
            refund_amount = updated.refund_amount,
            status = updated.status.as_str(),
            "refund recorded"
        );
        Ok(ReconciliationOutcome::RefundRecorded {
            transaction_id: updated.id,
            refund_amount: updated.refund_amount,
            status: updated.status,
        })
    }
}
