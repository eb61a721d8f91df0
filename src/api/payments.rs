//! Payment endpoints
//!
//! Thin handlers over [`PaymentLifecycle`](crate::payments::lifecycle::PaymentLifecycle):
//! they shape requests and responses and leave every state change to the engine.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::error::AppError;
use crate::payments::types::{Currency, Payment, PaymentStatus};
use crate::payments::validation::{PaymentRequest, ValidationErrors};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/", post(create_payment))
        .route("/v1/payments/all/", get(list_payments))
        .route("/v1/payments/:id/", get(get_payment))
        .route("/v1/payments/paypal/success/", get(paypal_success))
        .route("/v1/payments/paypal/cancel/", get(paypal_cancel))
}

/// Payment as shown to clients, identified by its display id
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentView {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.display_id(),
            customer_name: payment.customer_name.clone(),
            customer_email: payment.customer_email.clone(),
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
        }
    }
}

/// Listing entry, carrying the full id and creation time
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            customer_name: payment.customer_name.clone(),
            customer_email: payment.customer_email.clone(),
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment: PaymentView,
    pub redirect_url: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentDetailResponse {
    pub payment: PaymentView,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentSummary>,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub status: String,
    pub message: String,
    pub payment_id: Uuid,
}

/// Query string the gateway appends when redirecting the customer back
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub token: Option<String>,
}

impl CallbackParams {
    fn order_id(&self) -> Result<&str, ApiError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::bad_request("No order ID provided."))
    }
}

pub async fn create_payment(
    State(state): State<AppState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        let mut errors = ValidationErrors::default();
        errors.add("non_field_errors", rejection.body_text());
        ApiError::invalid(errors)
    })?;

    let input = request.validate().map_err(|errors| {
        info!(errors = %errors, "Rejected payment request");
        ApiError::invalid(errors)
    })?;

    let initiated = match state.payments.initiate(input).await {
        Ok(initiated) => initiated,
        Err(AppError::Gateway(e)) => {
            return Err(ApiError::bad_request(format!(
                "Payment processing failed: {}",
                e
            )));
        }
        Err(e) => return Err(ApiError::from_app(e, "Payment processing failed.")),
    };

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment: PaymentView::from(&initiated.payment),
            redirect_url: initiated.approval_url,
            status: "success".to_string(),
            message: "Payment initiated successfully. Redirect the customer to complete payment."
                .to_string(),
        }),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentDetailResponse>, ApiError> {
    // Anything that is not a payment id cannot name a payment.
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found())?;

    let payment = state
        .payments
        .get_payment(id)
        .await
        .map_err(|e| ApiError::from_app(e, "Error retrieving payment details."))?;

    Ok(Json(PaymentDetailResponse {
        payment: PaymentView::from(&payment),
        status: "success".to_string(),
        message: "Payment details retrieved successfully.".to_string(),
    }))
}

pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let payments = state
        .payments
        .list_payments()
        .await
        .map_err(|e| ApiError::from_app(e, "Error retrieving payments."))?;

    Ok(Json(PaymentListResponse {
        payments: payments.iter().map(PaymentSummary::from).collect(),
        status: "success".to_string(),
        message: "All payments retrieved successfully.".to_string(),
    }))
}

pub async fn paypal_success(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let order_id = params.order_id()?;

    let payment = state
        .payments
        .capture_by_reference(order_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound => {
                warn!(reference_id = %order_id, "Success callback for unknown order");
                ApiError::not_found()
            }
            rejected @ AppError::InvalidTransition { .. } => ApiError::from(rejected),
            other => ApiError::internal("Error completing payment.", &other),
        })?;

    Ok(Json(CallbackResponse {
        status: "success".to_string(),
        message: "Payment completed successfully.".to_string(),
        payment_id: payment.id,
    }))
}

pub async fn paypal_cancel(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let order_id = params.order_id()?;

    let payment = state
        .payments
        .cancel_by_reference(order_id)
        .await
        .map_err(|e| ApiError::from_app(e, "Error processing payment cancellation."))?;

    Ok(Json(CallbackResponse {
        status: "cancelled".to_string(),
        message: "Payment was cancelled.".to_string(),
        payment_id: payment.id,
    }))
}
