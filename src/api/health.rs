use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub store: String,
    pub gateway: String,
    pub gateway_configured: bool,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let (code, status) = match state.payments.ping_store().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "Payment store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        version,
        environment: state.config.server.environment.clone(),
        store: state.payments.store_backend().to_string(),
        gateway: state.payments.gateway_name().to_string(),
        gateway_configured: state.config.paypal.has_credentials(),
    };

    (code, Json(response))
}
