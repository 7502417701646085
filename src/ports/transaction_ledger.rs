//! Transaction ledger port.
//!
//! One row per payment intent. Rows created before an intent id is known
//! (legacy pre-created bookings) are found through their booking reference
//! and backfilled, so uniqueness is enforced by lookup-before-insert.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TransactionId};
use crate::domain::payments::{
    BookingRef, NewPaymentTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
};

/// Outcome of [`TransactionLedger::create`].
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerInsert {
    Created(PaymentTransaction),
    /// A row with the same payment intent id already existed; nothing written.
    Existing(PaymentTransaction),
}

impl LedgerInsert {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            LedgerInsert::Created(tx) | LedgerInsert::Existing(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> PaymentTransaction {
        match self {
            LedgerInsert::Created(tx) | LedgerInsert::Existing(tx) => tx,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, LedgerInsert::Created(_))
    }
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Most recent row funding `booking`.
    async fn find_by_booking(
        &self,
        booking: BookingRef,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Inserts a row unless one already exists for its payment intent id.
    async fn create(&self, new: NewPaymentTransaction) -> Result<LedgerInsert, DomainError>;

    /// Applies `patch` unconditionally.
    async fn update(
        &self,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<PaymentTransaction, DomainError>;

    /// Applies `patch` only while the row's status is one of `expected`.
    ///
    /// Returns `None` when the row moved on concurrently.
    async fn update_if_status(
        &self,
        id: TransactionId,
        expected: &[TransactionStatus],
        patch: &TransactionPatch,
    ) -> Result<Option<PaymentTransaction>, DomainError>;
}
