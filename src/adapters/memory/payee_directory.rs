//! In-memory payee directory.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, ResourceId, UserId};
use crate::domain::payments::{BookingType, OnboardingStatus};
use crate::ports::{Payee, PayeeDirectory, PayoutRecord, SaveResult};

#[derive(Default)]
struct Directory {
    payees: HashMap<UserId, Payee>,
    owners: HashMap<(BookingType, ResourceId), UserId>,
    payouts: HashMap<String, PayoutRecord>,
}

#[derive(Default)]
pub struct InMemoryPayeeDirectory {
    inner: RwLock<Directory>,
}

impl InMemoryPayeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_payee(&self, payee: Payee) {
        self.inner.write().await.payees.insert(payee.user_id, payee);
    }

    /// Records `payee_id` as the owner of a bookable resource.
    pub async fn assign_resource(
        &self,
        booking_type: BookingType,
        resource_id: ResourceId,
        payee_id: UserId,
    ) {
        self.inner
            .write()
            .await
            .owners
            .insert((booking_type, resource_id), payee_id);
    }

    pub async fn payee(&self, user_id: UserId) -> Option<Payee> {
        self.inner.read().await.payees.get(&user_id).cloned()
    }

    pub async fn payouts(&self) -> Vec<PayoutRecord> {
        self.inner.read().await.payouts.values().cloned().collect()
    }
}

#[async_trait]
impl PayeeDirectory for InMemoryPayeeDirectory {
    async fn find_by_connected_account(
        &self,
        account_id: &str,
    ) -> Result<Option<Payee>, DomainError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payees
            .values()
            .find(|p| p.connected_account_id.as_deref() == Some(account_id))
            .cloned())
    }

    async fn find_payee_for_resource(
        &self,
        booking_type: BookingType,
        resource_id: ResourceId,
    ) -> Result<Option<Payee>, DomainError> {
        let inner = self.inner.read().await;
        Ok(inner
            .owners
            .get(&(booking_type, resource_id))
            .and_then(|owner| inner.payees.get(owner))
            .cloned())
    }

    async fn update_onboarding_status(
        &self,
        payee_id: UserId,
        status: OnboardingStatus,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;
        let payee = inner.payees.get_mut(&payee_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::PayeeNotFound,
                format!("payee {} not found", payee_id),
            )
        })?;
        payee.onboarding_status = status;
        Ok(())
    }

    async fn record_payout(&self, record: &PayoutRecord) -> Result<SaveResult, DomainError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.payouts.get(&record.payout_id) {
            if !record.outcome.supersedes(existing.outcome) {
                return Ok(SaveResult::AlreadyExists);
            }
        }
        inner
            .payouts
            .insert(record.payout_id.clone(), record.clone());
        Ok(SaveResult::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PayoutOutcome;

    #[tokio::test]
    async fn resolves_payee_through_resource_owner() {
        let directory = InMemoryPayeeDirectory::new();
        directory
            .add_payee(Payee {
                user_id: UserId::new(9),
                connected_account_id: Some("acct_9".to_string()),
                onboarding_status: OnboardingStatus::Complete,
            })
            .await;
        directory
            .assign_resource(BookingType::Kitchen, ResourceId::new(7), UserId::new(9))
            .await;

        let payee = directory
            .find_payee_for_resource(BookingType::Kitchen, ResourceId::new(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payee.user_id, UserId::new(9));

        let none = directory
            .find_payee_for_resource(BookingType::Storage, ResourceId::new(7))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    fn payout(outcome: PayoutOutcome) -> PayoutRecord {
        PayoutRecord {
            payout_id: "po_1".to_string(),
            payee_id: UserId::new(9),
            connected_account_id: "acct_9".to_string(),
            amount: 42_000,
            currency: "cad".to_string(),
            outcome,
            failure_message: None,
            arrival_date: None,
        }
    }

    #[tokio::test]
    async fn failed_payout_overwrites_paid_but_not_the_reverse() {
        let directory = InMemoryPayeeDirectory::new();

        let paid = directory.record_payout(&payout(PayoutOutcome::Paid)).await.unwrap();
        let failed = directory.record_payout(&payout(PayoutOutcome::Failed)).await.unwrap();
        let paid_again = directory.record_payout(&payout(PayoutOutcome::Paid)).await.unwrap();

        assert_eq!(paid, SaveResult::Inserted);
        assert_eq!(failed, SaveResult::Inserted);
        assert_eq!(paid_again, SaveResult::AlreadyExists);
        assert_eq!(directory.payouts().await[0].outcome, PayoutOutcome::Failed);
    }
}
