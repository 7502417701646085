//! Paid storage extensions awaiting manager approval.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::{
    BookingId, ExtensionId, StateMachine, Timestamp, UserId, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    /// Created at checkout, not yet paid
    Pending,
    Paid,
    Approved,
    Rejected,
    Expired,
}

impl ExtensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Pending => "pending",
            ExtensionStatus::Paid => "paid",
            ExtensionStatus::Approved => "approved",
            ExtensionStatus::Rejected => "rejected",
            ExtensionStatus::Expired => "expired",
        }
    }

    /// Payment has already been recorded against this extension.
    pub fn payment_recorded(&self) -> bool {
        !matches!(self, ExtensionStatus::Pending)
    }
}

impl FromStr for ExtensionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExtensionStatus::Pending),
            "paid" => Ok(ExtensionStatus::Paid),
            "approved" => Ok(ExtensionStatus::Approved),
            "rejected" => Ok(ExtensionStatus::Rejected),
            "expired" => Ok(ExtensionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown extension status '{}'", other),
            )),
        }
    }
}

impl StateMachine for ExtensionStatus {
    const ALL: &'static [Self] = &[
        ExtensionStatus::Pending,
        ExtensionStatus::Paid,
        ExtensionStatus::Approved,
        ExtensionStatus::Rejected,
        ExtensionStatus::Expired,
    ];

    fn can_transition_to(&self, target: &Self) -> bool {
        use ExtensionStatus::*;
        matches!(
            (self, target),
            (Pending, Paid) | (Pending, Expired) | (Paid, Approved) | (Paid, Rejected) | (Paid, Expired)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingStorageExtension {
    pub id: ExtensionId,
    pub storage_booking_id: BookingId,
    pub new_end_date: Timestamp,
    pub extension_days: i32,
    pub extension_base_price: i64,
    pub extension_service_fee: i64,
    pub extension_total_price: i64,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub status: ExtensionStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStorageExtension {
    pub storage_booking_id: BookingId,
    pub chef_id: Option<UserId>,
    pub new_end_date: Timestamp,
    pub extension_days: i32,
    pub extension_base_price: i64,
    pub extension_service_fee: i64,
    pub extension_total_price: i64,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub status: ExtensionStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionUpdate {
    pub status: Option<ExtensionStatus>,
    pub payment_intent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_awaits_payment() {
        assert!(!ExtensionStatus::Pending.payment_recorded());
        assert!(ExtensionStatus::Paid.payment_recorded());
        assert!(ExtensionStatus::Approved.payment_recorded());
        assert!(ExtensionStatus::Expired.payment_recorded());
    }

    #[test]
    fn paid_extension_moves_to_manager_decision() {
        assert!(ExtensionStatus::Paid.can_transition_to(&ExtensionStatus::Approved));
        assert!(ExtensionStatus::Paid.can_transition_to(&ExtensionStatus::Rejected));
        assert!(!ExtensionStatus::Approved.can_transition_to(&ExtensionStatus::Paid));
        assert!(ExtensionStatus::Approved.is_terminal());
    }
}
