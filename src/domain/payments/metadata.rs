//! Versioned checkout metadata schema.
//!
//! Checkout sessions and payment intents carry a flat string map written
//! when the payment was initiated. It is decoded once, at the edge, into one
//! tagged variant per checkout flow so handlers never inspect optional keys.
//!
//! Flow selection:
//! 1. an explicit `type` key (`kitchen_booking`, `storage_extension`,
//!    `existing_booking`) wins;
//! 2. otherwise `storage_booking_id` selects the extension flow;
//! 3. otherwise `booking_id` selects the existing-booking flow, even when
//!    kitchen creation fields are also present;
//! 4. otherwise `kitchen_id` selects the kitchen booking flow.
//!
//! A map matching none of these carries no reconciliation metadata.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use super::booking::{BookingStatus, BookingType, NewKitchenBooking, PaymentStatus};
use super::extension::{ExtensionStatus, NewStorageExtension};
use crate::domain::foundation::{BookingId, ResourceId, Timestamp, UserId};

/// Metadata version written by the current checkout code.
pub const METADATA_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("missing metadata field: {0}")]
    Missing(&'static str),

    #[error("invalid metadata field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unsupported metadata version: {0}")]
    UnsupportedVersion(String),

    #[error("unknown checkout flow: {0}")]
    UnknownFlow(String),
}

/// Decoded checkout metadata, one variant per flow.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutMetadata {
    KitchenBooking(KitchenBookingMetadata),
    StorageExtension(StorageExtensionMetadata),
    ExistingBooking(ExistingBookingMetadata),
}

impl CheckoutMetadata {
    /// Decodes a raw metadata map.
    ///
    /// Returns `Ok(None)` when the map carries no recognised flow.
    pub fn decode(raw: &HashMap<String, String>) -> Result<Option<Self>, MetadataError> {
        let fields = Fields(raw);

        if let Some(version) = fields.raw("metadata_version") {
            if version != METADATA_VERSION {
                return Err(MetadataError::UnsupportedVersion(version.to_string()));
            }
        }

        let flow = match fields.raw("type") {
            Some("kitchen_booking") => Flow::Kitchen,
            Some("storage_extension") => Flow::Extension,
            Some("existing_booking") => Flow::Existing,
            Some(other) => return Err(MetadataError::UnknownFlow(other.to_string())),
            None if fields.has("storage_booking_id") => Flow::Extension,
            None if fields.has("booking_id") => Flow::Existing,
            None if fields.has("kitchen_id") => Flow::Kitchen,
            None => return Ok(None),
        };

        let decoded = match flow {
            Flow::Kitchen => Self::KitchenBooking(KitchenBookingMetadata::decode(&fields)?),
            Flow::Extension => Self::StorageExtension(StorageExtensionMetadata::decode(&fields)?),
            Flow::Existing => Self::ExistingBooking(ExistingBookingMetadata::decode(&fields)?),
        };
        Ok(Some(decoded))
    }
}

enum Flow {
    Kitchen,
    Extension,
    Existing,
}

/// Metadata for a kitchen booking created only once payment succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct KitchenBookingMetadata {
    pub kitchen_id: ResourceId,
    pub chef_id: UserId,
    pub manager_id: Option<UserId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub total_price_cents: i64,
    pub tax_cents: i64,
    pub platform_fee_cents: i64,
    pub notes: Option<String>,
}

impl KitchenBookingMetadata {
    fn decode(fields: &Fields<'_>) -> Result<Self, MetadataError> {
        let meta = Self {
            kitchen_id: fields.required("kitchen_id")?,
            chef_id: fields.required("chef_id")?,
            manager_id: fields.optional("manager_id")?,
            start_time: fields.timestamp("start_time")?,
            end_time: fields.timestamp("end_time")?,
            total_price_cents: fields.cents("total_price_cents")?,
            tax_cents: fields.optional_cents("tax_cents")?.unwrap_or(0),
            platform_fee_cents: fields.optional_cents("platform_fee_cents")?.unwrap_or(0),
            notes: fields.raw("notes").map(str::to_string),
        };

        if let (Some(start), Some(end)) = (meta.start_time, meta.end_time) {
            if end <= start {
                return Err(MetadataError::Invalid {
                    field: "end_time",
                    reason: "end_time must be after start_time".to_string(),
                });
            }
        }
        let base = meta
            .total_price_cents
            .checked_add(meta.tax_cents)
            .ok_or_else(|| MetadataError::Invalid {
                field: "tax_cents",
                reason: "price plus tax overflows".to_string(),
            })?;
        if meta.platform_fee_cents > base {
            return Err(MetadataError::Invalid {
                field: "platform_fee_cents",
                reason: "platform fee exceeds price plus tax".to_string(),
            });
        }
        Ok(meta)
    }

    /// Price plus tax, before fees. Decoding rejects sums that overflow.
    pub fn base_amount(&self) -> i64 {
        self.total_price_cents.saturating_add(self.tax_cents)
    }

    /// Gross charged: the session total when reported, else price plus tax.
    pub fn gross_amount(&self, reported_total: Option<i64>) -> i64 {
        reported_total.unwrap_or_else(|| self.base_amount())
    }

    pub fn to_new_booking(
        &self,
        payment_intent_id: Option<String>,
        checkout_session_id: Option<String>,
    ) -> NewKitchenBooking {
        NewKitchenBooking {
            kitchen_id: self.kitchen_id,
            chef_id: self.chef_id,
            start_time: self.start_time,
            end_time: self.end_time,
            total_price: self.total_price_cents,
            service_fee: self.platform_fee_cents,
            payment_intent_id,
            checkout_session_id,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Paid,
            notes: self.notes.clone(),
        }
    }
}

/// Metadata for extending an existing storage booking.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageExtensionMetadata {
    pub storage_booking_id: BookingId,
    pub new_end_date: Timestamp,
    pub extension_days: i32,
    pub extension_base_price_cents: i64,
    pub extension_service_fee_cents: i64,
    pub extension_total_price_cents: i64,
    pub chef_id: Option<UserId>,
}

impl StorageExtensionMetadata {
    fn decode(fields: &Fields<'_>) -> Result<Self, MetadataError> {
        let new_end_date = fields
            .timestamp("new_end_date")?
            .ok_or(MetadataError::Missing("new_end_date"))?;
        let extension_days: i32 = fields.required("extension_days")?;
        if extension_days <= 0 {
            return Err(MetadataError::Invalid {
                field: "extension_days",
                reason: format!("must be positive, got {}", extension_days),
            });
        }

        Ok(Self {
            storage_booking_id: fields.required("storage_booking_id")?,
            new_end_date,
            extension_days,
            extension_base_price_cents: fields.cents("extension_base_price_cents")?,
            extension_service_fee_cents: fields
                .optional_cents("extension_service_fee_cents")?
                .unwrap_or(0),
            extension_total_price_cents: fields.cents("extension_total_price_cents")?,
            chef_id: fields.optional("chef_id")?,
        })
    }

    pub fn payee_revenue(&self) -> i64 {
        self.extension_total_price_cents - self.extension_service_fee_cents
    }

    pub fn to_new_extension(
        &self,
        checkout_session_id: &str,
        payment_intent_id: Option<String>,
    ) -> NewStorageExtension {
        NewStorageExtension {
            storage_booking_id: self.storage_booking_id,
            chef_id: self.chef_id,
            new_end_date: self.new_end_date,
            extension_days: self.extension_days,
            extension_base_price: self.extension_base_price_cents,
            extension_service_fee: self.extension_service_fee_cents,
            extension_total_price: self.extension_total_price_cents,
            checkout_session_id: checkout_session_id.to_string(),
            payment_intent_id,
            status: ExtensionStatus::Paid,
        }
    }
}

/// Legacy metadata pointing at a booking row created before checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingBookingMetadata {
    pub booking_id: BookingId,
    pub booking_type: BookingType,
    /// Kitchen creation fields were present and ignored
    pub creation_fields_present: bool,
}

impl ExistingBookingMetadata {
    fn decode(fields: &Fields<'_>) -> Result<Self, MetadataError> {
        let booking_type = match fields.raw("booking_type") {
            Some(raw) => raw.parse().map_err(|_| MetadataError::Invalid {
                field: "booking_type",
                reason: format!("unknown booking type '{}'", raw),
            })?,
            None => BookingType::Kitchen,
        };
        Ok(Self {
            booking_id: fields.required("booking_id")?,
            booking_type,
            creation_fields_present: fields.has("kitchen_id"),
        })
    }
}

struct Fields<'a>(&'a HashMap<String, String>);

impl Fields<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    fn required<T: FromStr>(&self, key: &'static str) -> Result<T, MetadataError> {
        self.optional(key)?.ok_or(MetadataError::Missing(key))
    }

    fn optional<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, MetadataError> {
        self.raw(key)
            .map(|raw| {
                raw.parse().map_err(|_| MetadataError::Invalid {
                    field: key,
                    reason: format!("cannot parse '{}'", raw),
                })
            })
            .transpose()
    }

    fn cents(&self, key: &'static str) -> Result<i64, MetadataError> {
        self.optional_cents(key)?.ok_or(MetadataError::Missing(key))
    }

    fn optional_cents(&self, key: &'static str) -> Result<Option<i64>, MetadataError> {
        match self.optional::<i64>(key)? {
            Some(v) if v < 0 => Err(MetadataError::Invalid {
                field: key,
                reason: format!("amount must not be negative, got {}", v),
            }),
            other => Ok(other),
        }
    }

    /// Accepts RFC 3339 or a bare `YYYY-MM-DD` date (midnight UTC).
    fn timestamp(&self, key: &'static str) -> Result<Option<Timestamp>, MetadataError> {
        let Some(raw) = self.raw(key) else {
            return Ok(None);
        };
        if let Some(ts) = Timestamp::parse_rfc3339(raw) {
            return Ok(Some(ts));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Some(Timestamp::from_datetime(dt.and_utc())))
            .ok_or_else(|| MetadataError::Invalid {
                field: key,
                reason: format!("not a date or timestamp: '{}'", raw),
            })
    }
}
