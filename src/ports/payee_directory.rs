//! Payee profiles: connected accounts, onboarding status and payouts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::webhook_event_repository::SaveResult;
use crate::domain::foundation::{DomainError, ResourceId, Timestamp, UserId};
use crate::domain::payments::{BookingType, OnboardingStatus};

/// The party receiving funds for a resource, typically a location manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payee {
    pub user_id: UserId,
    pub connected_account_id: Option<String>,
    pub onboarding_status: OnboardingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutOutcome {
    Paid,
    Failed,
}

impl PayoutOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutOutcome::Paid => "paid",
            PayoutOutcome::Failed => "failed",
        }
    }

    /// A paid payout can still bounce; nothing else overwrites a recorded outcome.
    pub fn supersedes(&self, previous: PayoutOutcome) -> bool {
        matches!((previous, self), (PayoutOutcome::Paid, PayoutOutcome::Failed))
    }
}

/// A payout to a payee's connected account, keyed by processor payout id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub payout_id: String,
    pub payee_id: UserId,
    pub connected_account_id: String,
    pub amount: i64,
    pub currency: String,
    pub outcome: PayoutOutcome,
    pub failure_message: Option<String>,
    pub arrival_date: Option<Timestamp>,
}

#[async_trait]
pub trait PayeeDirectory: Send + Sync {
    async fn find_by_connected_account(
        &self,
        account_id: &str,
    ) -> Result<Option<Payee>, DomainError>;

    /// Owner of the kitchen, storage listing or equipment behind a booking.
    async fn find_payee_for_resource(
        &self,
        booking_type: BookingType,
        resource_id: ResourceId,
    ) -> Result<Option<Payee>, DomainError>;

    async fn update_onboarding_status(
        &self,
        payee_id: UserId,
        status: OnboardingStatus,
    ) -> Result<(), DomainError>;

    /// Stores a payout outcome once per payout id. A later outcome is written
    /// over the stored one only when it supersedes it.
    async fn record_payout(&self, record: &PayoutRecord) -> Result<SaveResult, DomainError>;
}
