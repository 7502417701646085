//! Kitchen Payments - Payment webhook reconciliation
//!
//! This crate turns payment processor webhooks into ledger rows, booking
//! payment states and payee notifications for a shared-kitchen rental
//! marketplace.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
