//! Payment lifecycle module
//!
//! Gateway integration, the payment state machine, and the background
//! reconciliation that keeps local records in step with the gateway.

pub mod errors;
pub mod lifecycle;
pub mod providers;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod validation;
