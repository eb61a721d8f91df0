use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paypal_payments_backend::api::{self, AppState};
use paypal_payments_backend::config::Config;
use paypal_payments_backend::database::{InMemoryPaymentStore, PaymentStore};
use paypal_payments_backend::payments::lifecycle::PaymentLifecycle;
use paypal_payments_backend::payments::providers::PayPalProvider;
use paypal_payments_backend::payments::reconciliation::{
    ReconciliationScheduler, ReconciliationWorker,
};
use paypal_payments_backend::payments::types::RedirectUrls;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(feature = "database")]
async fn build_store(config: &Config) -> Result<Arc<dyn PaymentStore>> {
    use paypal_payments_backend::database::{init_pool, PgPaymentRepository};

    let Some(url) = config.database.url.as_deref() else {
        warn!("DATABASE_URL not set; payments are kept in memory and lost on restart");
        return Ok(Arc::new(InMemoryPaymentStore::new()));
    };

    let pool = init_pool(url, Some(config.database.pool_config()))
        .await
        .context("Failed to connect to the database")?;
    let repository = PgPaymentRepository::new(pool);
    repository
        .ensure_schema()
        .await
        .context("Failed to prepare the payments schema")?;

    Ok(Arc::new(repository))
}

#[cfg(not(feature = "database"))]
async fn build_store(config: &Config) -> Result<Arc<dyn PaymentStore>> {
    if config.database.url.is_some() {
        warn!("DATABASE_URL ignored: built without the `database` feature");
    }
    warn!("Payments are kept in memory and lost on restart");
    Ok(Arc::new(InMemoryPaymentStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    // Load configuration
    let config = Config::from_env()?;

    info!("Starting PayPal payments backend");
    info!("Environment: {}", config.server.environment);
    info!("PayPal API: {}", config.paypal.base_url);
    if !config.paypal.has_credentials() {
        warn!("PAYPAL_CLIENT_ID / PAYPAL_CLIENT_SECRET not set; gateway calls will be rejected");
    }

    let store = build_store(&config).await?;
    let gateway = Arc::new(
        PayPalProvider::new(config.paypal.clone()).context("Failed to build the PayPal client")?,
    );

    let (scheduler, queue) = ReconciliationScheduler::new(config.reconciliation.delay());
    let payments = Arc::new(PaymentLifecycle::new(
        gateway,
        store,
        scheduler,
        RedirectUrls::from_base_url(&config.server.base_url),
    ));
    let worker = ReconciliationWorker::new(
        queue,
        Arc::clone(&payments),
        config.reconciliation.max_concurrency,
    )
    .spawn();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;
    let app = api::router(AppState::new(config, payments));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending checks are best-effort and are dropped on shutdown.
    worker.abort();
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl+C signal; shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for ctrl+C; shutting down"),
    }
}
