//! Stripe adapters for the `PaymentProcessor` port.
//!
//! - `StripePaymentProcessor` - REST client for session, intent and
//!   balance-transaction lookups
//! - `MockPaymentProcessor` - configurable stand-in for tests
//!
//! Signature verification is pure and lives in the domain; this module only
//! makes outbound calls.

mod mock_payment_processor;
mod stripe_adapter;

pub use mock_payment_processor::{MethodCall, MockPaymentProcessor};
pub use stripe_adapter::{StripeConfig, StripePaymentProcessor};
