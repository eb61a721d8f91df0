//! Payment gateway implementations
//!
//! Concrete implementations of the PaymentGateway trait.

pub mod paypal;

pub use paypal::{PayPalConfig, PayPalProvider};
