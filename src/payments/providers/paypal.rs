//! PayPal payment gateway implementation
//!
//! This module integrates with the PayPal Orders v2 API: OAuth2 client-credentials
//! token exchange, order creation with redirect URLs, capture, and order lookup.

use crate::payments::errors::{GatewayError, GatewayResult};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{GatewayOrder, OrderRequest};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

/// Seconds shaved off `expires_in` before a cached token is considered stale
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// PayPal gateway configuration
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    /// REST app client id
    pub client_id: String,
    /// REST app client secret
    pub client_secret: String,
    /// PayPal API base URL (defaults to the sandbox)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Reuse access tokens until shortly before they expire
    pub cache_tokens: bool,
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            cache_tokens: false,
        }
    }
}

impl PayPalConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            client_id: std::env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
            base_url: std::env::var("PAYPAL_API_URL").unwrap_or(defaults.base_url),
            timeout_secs: std::env::var("PAYPAL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            cache_tokens: std::env::var("PAYPAL_CACHE_TOKENS")
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.cache_tokens),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// PayPal payment gateway
pub struct PayPalProvider {
    config: PayPalConfig,
    client: Client,
    token_cache: RwLock<Option<CachedToken>>,
}

impl PayPalProvider {
    /// Create a new PayPal provider instance
    pub fn new(config: PayPalConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            cache_tokens = config.cache_tokens,
            "PayPal provider initialized"
        );

        Ok(Self {
            config,
            client,
            token_cache: RwLock::new(None),
        })
    }

    /// Send a request and read its body as JSON.
    ///
    /// Non-JSON bodies are kept as a string value so they can still be logged.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Value), String> {
        let response = request
            .send()
            .await
            .map_err(|e| self.describe_transport_error(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.describe_transport_error(&e))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok((status, body))
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out after {} seconds", self.config.timeout_secs)
        } else {
            format!("request error: {}", err)
        }
    }

    async fn cached_token(&self) -> Option<String> {
        if !self.config.cache_tokens {
            return None;
        }
        let cache = self.token_cache.read().await;
        cache
            .as_ref()
            .filter(|token| token.expires_at > Utc::now())
            .map(|token| token.access_token.clone())
    }

    async fn store_token(&self, access_token: &str, expires_in: i64) {
        if !self.config.cache_tokens {
            return;
        }
        let lifetime = (expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            access_token: access_token.to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        });
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", token))
    }
}

/// Build the Orders v2 creation payload
pub fn order_payload(request: &OrderRequest) -> Value {
    json!({
        "intent": "CAPTURE",
        "purchase_units": [
            {
                "amount": {
                    "currency_code": request.currency.code(),
                    "value": request.amount.to_string(),
                },
                "description": request.description(),
            }
        ],
        "application_context": {
            "return_url": request.return_url,
            "cancel_url": request.cancel_url,
        }
    })
}

/// Find the `href` of the link with relation "approve"
pub fn approval_link(body: &Value) -> Option<String> {
    body.get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("approve"))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl PaymentGateway for PayPalProvider {
    async fn acquire_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.cached_token().await {
            debug!("Reusing cached PayPal access token");
            return Ok(token);
        }

        let credentials = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ));

        let request = self
            .client
            .post(self.config.endpoint("/v1/oauth2/token"))
            .header("Accept", "application/json")
            .header("Accept-Language", "en_US")
            .header("Authorization", format!("Basic {}", credentials))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials");

        let (status, body) = self.send(request).await.map_err(|message| {
            error!(error = %message, "PayPal token exception");
            GatewayError::auth(message, None)
        })?;

        if status != StatusCode::OK {
            error!(status = status.as_u16(), response = %body, "PayPal token error");
            return Err(GatewayError::auth(
                format!("HTTP {}: failed to get access token", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                error!("PayPal token response did not include an access token");
                GatewayError::auth("response did not include an access token", Some(200))
            })?
            .to_string();

        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        self.store_token(&access_token, expires_in).await;

        Ok(access_token)
    }

    async fn create_order(&self, request: &OrderRequest) -> GatewayResult<GatewayOrder> {
        info!(
            amount = %request.amount,
            currency = %request.currency,
            "Creating PayPal order"
        );

        let token = self.acquire_token().await?;
        let payload = order_payload(request);
        let http_request = self
            .authorized(
                self.client.post(self.config.endpoint("/v2/checkout/orders")),
                &token,
            )
            .json(&payload);

        let (status, body) = self.send(http_request).await.map_err(|message| {
            error!(error = %message, "PayPal order exception");
            GatewayError::order(message, None)
        })?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            error!(status = status.as_u16(), response = %body, "PayPal order error");
            return Err(GatewayError::order(
                format!("HTTP {}: failed to create order", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        let order_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::order("response did not include an order id", Some(status.as_u16()))
            })?
            .to_string();

        let approval_url = approval_link(&body).ok_or_else(|| {
            error!(order_id = %order_id, "PayPal order response has no approve link");
            GatewayError::order(
                "response did not include an approve link",
                Some(status.as_u16()),
            )
        })?;

        info!(order_id = %order_id, "PayPal order created");

        Ok(GatewayOrder {
            order_id,
            approval_url,
            raw: body,
        })
    }

    async fn capture_order(&self, order_id: &str) -> GatewayResult<Value> {
        info!(order_id = %order_id, "Capturing PayPal order");

        let token = self.acquire_token().await?;
        let url = self
            .config
            .endpoint(&format!("/v2/checkout/orders/{}/capture", order_id));
        let request = self.authorized(self.client.post(url), &token);

        let (status, body) = self.send(request).await.map_err(|message| {
            error!(order_id = %order_id, error = %message, "PayPal capture exception");
            GatewayError::capture(message, None)
        })?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            error!(
                order_id = %order_id,
                status = status.as_u16(),
                response = %body,
                "PayPal capture error"
            );
            return Err(GatewayError::capture(
                format!("HTTP {}: failed to capture order", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        info!(order_id = %order_id, "PayPal order captured");
        Ok(body)
    }

    async fn fetch_order_status(&self, order_id: &str) -> GatewayResult<Value> {
        debug!(order_id = %order_id, "Fetching PayPal order status");

        let token = self
            .acquire_token()
            .await
            .map_err(|e| GatewayError::verification(e.to_string(), e.status()))?;
        let url = self
            .config
            .endpoint(&format!("/v2/checkout/orders/{}", order_id));
        let request = self.authorized(self.client.get(url), &token);

        let (status, body) = self
            .send(request)
            .await
            .map_err(|message| GatewayError::verification(message, None))?;

        if status != StatusCode::OK {
            error!(
                order_id = %order_id,
                status = status.as_u16(),
                response = %body,
                "PayPal verification error"
            );
            return Err(GatewayError::verification(
                format!("HTTP {}: failed to fetch order", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        Ok(body)
    }

    fn name(&self) -> &'static str {
        "paypal"
    }
}
