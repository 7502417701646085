//! PostgreSQL adapters - Database implementations for the persistence ports.
//!
//! - `PostgresTransactionLedger` - ledger rows keyed by payment intent
//! - `PostgresBookingStore` - kitchen, storage and equipment booking tables
//! - `PostgresBookingService` - booking and extension creation
//! - `PostgresPayeeDirectory` - payees, resource ownership and payouts
//! - `PostgresWebhookEventRepository` - processed event ids

mod booking_service;
mod booking_store;
mod payee_directory;
mod transaction_ledger;
mod webhook_event_repository;

pub use booking_service::PostgresBookingService;
pub use booking_store::PostgresBookingStore;
pub use payee_directory::PostgresPayeeDirectory;
pub use transaction_ledger::PostgresTransactionLedger;
pub use webhook_event_repository::PostgresWebhookEventRepository;
