//! AccountUpdatedHandler - connected account onboarding progress.

use std::sync::Arc;

use super::outcome::ReconciliationOutcome;
use crate::domain::payments::{ConnectedAccount, OnboardingStatus, WebhookError};
use crate::ports::PayeeDirectory;

pub struct AccountUpdatedHandler {
    payees: Arc<dyn PayeeDirectory>,
}

impl AccountUpdatedHandler {
    pub fn new(payees: Arc<dyn PayeeDirectory>) -> Self {
        Self { payees }
    }

    pub async fn handle(
        &self,
        account: &ConnectedAccount,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let Some(payee) = self.payees.find_by_connected_account(&account.id).await? else {
            return Ok(ReconciliationOutcome::Ignored(format!(
                "no payee for connected account {}",
                account.id
            )));
        };

        let status = OnboardingStatus::from_capabilities(
            account.charges_enabled,
            account.payouts_enabled,
            account.details_submitted,
        );
        if payee.onboarding_status == status {
            return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                "payee {} already {}",
                payee.user_id,
                status.as_str()
            )));
        }

        self.payees
            .update_onboarding_status(payee.user_id, status)
            .await?;
        tracing::info!(
            payee_id = %payee.user_id,
            from = payee.onboarding_status.as_str(),
            to = status.as_str(),
            "onboarding status updated"
        );
        Ok(ReconciliationOutcome::OnboardingUpdated {
            payee_id: payee.user_id,
            status,
        })
    }
}
