//! Bookings funded by processor payments.
//!
//! Three booking variants share one shape for reconciliation purposes. The
//! `payment_status` column is a projection of the ledger row and only ever
//! moves along the edges declared by [`PaymentStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    BookingId, ResourceId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Which booking table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    Kitchen,
    Storage,
    Equipment,
}

impl BookingType {
    pub const ALL: [BookingType; 3] = [
        BookingType::Kitchen,
        BookingType::Storage,
        BookingType::Equipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Kitchen => "kitchen",
            BookingType::Storage => "storage",
            BookingType::Equipment => "equipment",
        }
    }
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kitchen" => Ok(BookingType::Kitchen),
            "storage" => Ok(BookingType::Storage),
            "equipment" => Ok(BookingType::Equipment),
            other => Err(ValidationError::invalid_format(
                "booking_type",
                format!("unknown booking type '{}'", other),
            )),
        }
    }
}

/// Reference from a ledger row to the booking it funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingRef {
    pub id: BookingId,
    pub booking_type: BookingType,
}

impl BookingRef {
    pub fn kitchen(id: BookingId) -> Self {
        Self {
            id,
            booking_type: BookingType::Kitchen,
        }
    }

    pub fn storage(id: BookingId) -> Self {
        Self {
            id,
            booking_type: BookingType::Storage,
        }
    }
}

/// Domain status of a booking, independent of payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown booking status '{}'", other),
            )),
        }
    }
}

/// Payment status projected onto booking rows.
///
/// ```text
/// pending -> paid | failed
/// pending -> refunded | partially_refunded   (refund seen before success)
/// paid -> refunded | partially_refunded
/// partially_refunded -> partially_refunded | refunded
/// ```
///
/// `failed` and `refunded` are terminal. A row never returns to `paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

impl StateMachine for PaymentStatus {
    const ALL: &'static [Self] = &[
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::PartiallyRefunded,
    ];

    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Paid)
                | (Pending, Failed)
                | (Pending, Refunded)
                | (Pending, PartiallyRefunded)
                | (Paid, Refunded)
                | (Paid, PartiallyRefunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }
}

/// A kitchen, storage or equipment booking as seen by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub booking_type: BookingType,
    pub renter_id: UserId,
    pub resource_id: ResourceId,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    /// Price charged to the renter, in cents
    pub total_price: i64,
    pub service_fee: i64,
    /// Settled processor fee copied from the ledger
    pub processor_fee: Option<i64>,
    /// Settled amount owed to the payee copied from the ledger
    pub payee_net: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

impl Booking {
    pub fn reference(&self) -> BookingRef {
        BookingRef {
            id: self.id,
            booking_type: self.booking_type,
        }
    }
}

/// Fields for a kitchen booking created after payment succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKitchenBooking {
    pub kitchen_id: ResourceId,
    pub chef_id: UserId,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub total_price: i64,
    pub service_fee: i64,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
}

impl NewKitchenBooking {
    /// True when `booking` carries every field this request would write.
    ///
    /// Used to read back a fallback insert before trusting it.
    pub fn matches(&self, booking: &Booking) -> bool {
        booking.booking_type == BookingType::Kitchen
            && booking.resource_id == self.kitchen_id
            && booking.renter_id == self.chef_id
            && booking.start_time == self.start_time
            && booking.end_time == self.end_time
            && booking.total_price == self.total_price
            && booking.service_fee == self.service_fee
            && booking.payment_intent_id == self.payment_intent_id
            && booking.payment_status == self.payment_status
    }
}
