//! In-memory adapters.
//!
//! Back the reconciliation tests and local runs without a database. State
//! lives behind `tokio::sync::RwLock`, so nothing here can poison or panic.

mod booking_service;
mod booking_store;
mod ledger;
mod notifier;
mod payee_directory;
mod webhook_events;

pub use booking_service::InMemoryBookingService;
pub use booking_store::InMemoryBookingStore;
pub use ledger::InMemoryTransactionLedger;
pub use notifier::{RecordingNotifier, SentNotification};
pub use payee_directory::InMemoryPayeeDirectory;
pub use webhook_events::InMemoryWebhookEventRepository;
