//! Payments domain: ledger rows, bookings, checkout metadata and the
//! processor event vocabulary.

mod booking;
mod event;
mod extension;
mod metadata;
mod onboarding;
mod transaction;
mod webhook_errors;
mod webhook_verifier;

pub use booking::{
    Booking, BookingRef, BookingStatus, BookingType, NewKitchenBooking, PaymentStatus,
};
pub use event::{
    Charge, CheckoutSession, ConnectedAccount, EventData, EventKind, Expandable,
    LastPaymentError, PaymentIntent, Payout, ProcessorEvent, ReconciliationEvent, Refund,
    RefundList, TransferData,
};
pub use extension::{ExtensionStatus, ExtensionUpdate, NewStorageExtension, PendingStorageExtension};
pub use metadata::{
    CheckoutMetadata, ExistingBookingMetadata, KitchenBookingMetadata, MetadataError,
    StorageExtensionMetadata, METADATA_VERSION,
};
pub use onboarding::OnboardingStatus;
pub use transaction::{
    NewPaymentTransaction, PaymentTransaction, RefundAssessment, RefundDecision, SettledAmounts,
    TransactionPatch, TransactionStatus,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{
    constant_time_compare, sign_payload, SignatureHeader, VerificationMode, WebhookVerifier,
};
