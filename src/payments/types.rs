//! Payment domain types and the lifecycle state machine
//!
//! Types shared by the gateway client, the record store and the lifecycle engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Prefix of the shortened id shown to API clients
pub const DISPLAY_ID_PREFIX: &str = "PAY-";

/// Currencies accepted at payment creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl Currency {
    pub const ALLOWED: [Currency; 5] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Cad,
        Currency::Aud,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALLOWED
            .iter()
            .copied()
            .find(|c| c.code() == s)
            .ok_or_else(|| {
                let codes: Vec<&str> = Currency::ALLOWED.iter().map(|c| c.code()).collect();
                format!("Currency must be one of {}", codes.join(", "))
            })
    }
}

/// Local payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Assigned out-of-band only; no lifecycle operation produces it.
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }

    /// Directed edges of the lifecycle. Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;

        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Validated input for a new payment
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub customer_name: String,
    pub customer_email: String,
    /// Always carries exactly two fractional digits
    pub amount: Decimal,
    pub currency: Currency,
}

/// Payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Gateway order id; set once when the gateway accepts the order
    pub reference_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// Last raw gateway payload, replaced wholesale on every successful call
    pub gateway_response: Option<serde_json::Value>,
    pub approval_url: Option<String>,
    /// Optimistic concurrency token, bumped by the store on every update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(input: NewPayment) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference_id: None,
            customer_name: input.customer_name,
            customer_email: input.customer_email,
            amount: input.amount,
            currency: input.currency,
            status: PaymentStatus::Pending,
            gateway_response: None,
            approval_url: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shortened id exposed to clients, e.g. `PAY-1a2b3c4d`
    pub fn display_id(&self) -> String {
        let full = self.id.to_string();
        format!("{}{}", DISPLAY_ID_PREFIX, &full[..8])
    }

    /// Moves the payment to `next`, returning whether the status changed.
    pub fn transition_to(&mut self, next: PaymentStatus) -> AppResult<bool> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                payment_id: self.id,
                from: self.status,
                to: next,
            });
        }
        let changed = self.status != next;
        self.status = next;
        Ok(changed)
    }

    /// Records an accepted gateway order and moves the payment to `processing`.
    pub fn record_order(&mut self, order: &GatewayOrder) -> AppResult<()> {
        if let Some(existing) = &self.reference_id {
            if existing != &order.order_id {
                return Err(AppError::ReferenceAlreadyAssigned {
                    payment_id: self.id,
                    reference_id: existing.clone(),
                });
            }
        }
        self.transition_to(PaymentStatus::Processing)?;
        self.reference_id = Some(order.order_id.clone());
        self.approval_url = Some(order.approval_url.clone());
        self.gateway_response = Some(order.raw.clone());
        Ok(())
    }
}

/// Order creation request sent to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub customer_name: String,
    pub return_url: String,
    pub cancel_url: String,
}

impl OrderRequest {
    pub fn for_payment(payment: &Payment, urls: &RedirectUrls) -> Self {
        Self {
            amount: payment.amount,
            currency: payment.currency,
            customer_name: payment.customer_name.clone(),
            return_url: urls.return_url.clone(),
            cancel_url: urls.cancel_url.clone(),
        }
    }

    pub fn description(&self) -> String {
        format!("Payment for {}", self.customer_name)
    }
}

/// Where the gateway sends the customer after approval or cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrls {
    pub return_url: String,
    pub cancel_url: String,
}

impl RedirectUrls {
    pub fn from_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            return_url: format!("{}/v1/payments/paypal/success/", base),
            cancel_url: format!("{}/v1/payments/paypal/cancel/", base),
        }
    }
}

/// Order accepted by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub approval_url: String,
    pub raw: serde_json::Value,
}

/// Order status as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    Created,
    Saved,
    Approved,
    Voided,
    Completed,
    PayerActionRequired,
    Declined,
    Unknown(String),
}

impl GatewayOrderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATED" => GatewayOrderStatus::Created,
            "SAVED" => GatewayOrderStatus::Saved,
            "APPROVED" => GatewayOrderStatus::Approved,
            "VOIDED" => GatewayOrderStatus::Voided,
            "COMPLETED" => GatewayOrderStatus::Completed,
            "PAYER_ACTION_REQUIRED" => GatewayOrderStatus::PayerActionRequired,
            "DECLINED" => GatewayOrderStatus::Declined,
            other => GatewayOrderStatus::Unknown(other.to_string()),
        }
    }

    /// Reads the top-level `status` field of a raw order payload.
    pub fn from_raw(raw: &serde_json::Value) -> Self {
        Self::parse(raw.get("status").and_then(|s| s.as_str()).unwrap_or(""))
    }

    /// Local status implied by this gateway status, if any.
    pub fn local_status(&self) -> Option<PaymentStatus> {
        match self {
            GatewayOrderStatus::Completed => Some(PaymentStatus::Completed),
            GatewayOrderStatus::Approved => Some(PaymentStatus::Processing),
            GatewayOrderStatus::Voided | GatewayOrderStatus::Declined => {
                Some(PaymentStatus::Failed)
            }
            _ => None,
        }
    }
}
