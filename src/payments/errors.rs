use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures of the payment gateway, one variant per gateway operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Gateway authentication failed: {message}")]
    Auth { message: String, status: Option<u16> },

    #[error("Gateway order creation failed: {message}")]
    Order { message: String, status: Option<u16> },

    #[error("Gateway capture failed: {message}")]
    Capture { message: String, status: Option<u16> },

    #[error("Gateway verification failed: {message}")]
    Verification { message: String, status: Option<u16> },
}

impl GatewayError {
    pub fn auth(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Auth {
            message: message.into(),
            status,
        }
    }

    pub fn order(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Order {
            message: message.into(),
            status,
        }
    }

    pub fn capture(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Capture {
            message: message.into(),
            status,
        }
    }

    pub fn verification(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Verification {
            message: message.into(),
            status,
        }
    }

    /// HTTP status returned by the gateway, if the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. }
            | Self::Order { status, .. }
            | Self::Capture { status, .. }
            | Self::Verification { status, .. } => *status,
        }
    }

    /// Transport failures, rate limits and 5xx answers may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            None => true,
            Some(code) => code == 429 || code >= 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::order("connection reset", None).is_retryable());
        assert!(GatewayError::capture("HTTP 503", Some(503)).is_retryable());
        assert!(GatewayError::auth("HTTP 429", Some(429)).is_retryable());
        assert!(!GatewayError::order("HTTP 422", Some(422)).is_retryable());
        assert!(!GatewayError::auth("HTTP 401", Some(401)).is_retryable());
    }

    #[test]
    fn test_display_names_operation() {
        let err = GatewayError::capture("HTTP 422", Some(422));
        assert_eq!(err.to_string(), "Gateway capture failed: HTTP 422");
        assert_eq!(err.status(), Some(422));
    }
}
