//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the reconciliation core to external systems:
//! - `postgres` - Ledger, booking, payee and event tables
//! - `stripe` - Processor REST client and test double
//! - `memory` - In-memory persistence for tests and local runs
//! - `notifications` - Notifier backed by structured logs
//! - `rate_limiter` - Fixed-window limiter for administrative endpoints
//! - `http` - Axum routes

pub mod http;
pub mod memory;
pub mod notifications;
pub mod postgres;
pub mod rate_limiter;
pub mod stripe;
