//! PayPal-backed payment service
//!
//! Payments are created through the HTTP API, handed to the gateway as orders,
//! and driven to a final status by customer callbacks, on-demand reads and a
//! delayed background reconciliation.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
