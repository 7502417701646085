//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, errors, state machines)
//! - `payments` - Ledger, bookings, checkout metadata and processor events

pub mod foundation;
pub mod payments;
