//! Lifecycle-level error taxonomy
//!
//! Gateway, store and validation failures are converted into [`AppError`] at the
//! lifecycle engine boundary; the API surface maps each variant to a response.

use thiserror::Error;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::payments::errors::GatewayError;
use crate::payments::types::PaymentStatus;
use crate::payments::validation::ValidationErrors;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid payment data")]
    Validation(ValidationErrors),

    #[error("Payment not found.")]
    NotFound,

    #[error("Payment {payment_id} has no gateway order to capture")]
    CaptureTargetMissing { payment_id: Uuid },

    #[error("Payment {payment_id} cannot move from {from} to {to}")]
    InvalidTransition {
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment {payment_id} is already bound to gateway order {reference_id}")]
    ReferenceAlreadyAssigned {
        payment_id: Uuid,
        reference_id: String,
    },

    #[error("Payment {payment_id} kept changing underneath the update")]
    Conflict { payment_id: Uuid },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}
