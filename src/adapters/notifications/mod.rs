//! Notifier adapters.

mod logging_notifier;

pub use logging_notifier::LoggingNotifier;
