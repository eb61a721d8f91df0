//! Payment gateway trait definitions
//!
//! Defines the interface the lifecycle engine uses to reach the external gateway.

use crate::payments::errors::GatewayResult;
use crate::payments::types::{GatewayOrder, OrderRequest};
use async_trait::async_trait;

/// Trait for payment gateway implementations
///
/// Every method is a single network round trip (plus a token exchange). None of
/// them retry; callers decide whether a failure is worth another attempt.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchange the configured client credentials for a bearer token
    ///
    /// # Errors
    /// * `GatewayError::Auth` - non-200 answer or no access token in the body
    async fn acquire_token(&self) -> GatewayResult<String>;

    /// Create an order with intent "capture"
    ///
    /// # Returns
    /// * `GatewayOrder` - gateway order id, approval URL and the raw response
    ///
    /// # Errors
    /// * `GatewayError::Order` - non-2xx answer or no "approve" link
    async fn create_order(&self, request: &OrderRequest) -> GatewayResult<GatewayOrder>;

    /// Capture a customer-approved order, returning the raw gateway response
    async fn capture_order(&self, order_id: &str) -> GatewayResult<serde_json::Value>;

    /// Read the current order, returning the raw gateway response
    async fn fetch_order_status(&self, order_id: &str) -> GatewayResult<serde_json::Value>;

    /// Short name used in logs and health output
    fn name(&self) -> &'static str;
}
