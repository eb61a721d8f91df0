use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::database::PoolConfig;
use crate::payments::providers::PayPalConfig;
use crate::payments::reconciliation::{DEFAULT_MAX_CONCURRENCY, DEFAULT_RECONCILE_DELAY};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub paypal: PayPalConfig,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Public URL the gateway redirects customers back to
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Unset means payments are kept in memory
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub delay_secs: u64,
    pub max_concurrency: usize,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            ..PoolConfig::default()
        }
    }
}

impl ReconciliationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                environment: "development".to_string(),
                base_url: "http://localhost:8000".to_string(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
            },
            paypal: PayPalConfig::default(),
            reconciliation: ReconciliationConfig {
                delay_secs: DEFAULT_RECONCILE_DELAY.as_secs(),
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
            },
        }
    }
}

/// Read `key`, falling back to `default` when it is unset.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or(defaults.server.host),
            port: parse_var("PORT", defaults.server.port)?,
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.server.environment),
            base_url: env::var("BASE_URL").unwrap_or(defaults.server.base_url),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
        };

        let paypal = PayPalConfig {
            timeout_secs: parse_var("PAYPAL_TIMEOUT_SECS", defaults.paypal.timeout_secs)?,
            ..PayPalConfig::from_env()
        };

        let reconciliation = ReconciliationConfig {
            delay_secs: parse_var("RECONCILE_DELAY_SECS", defaults.reconciliation.delay_secs)?,
            max_concurrency: parse_var(
                "RECONCILE_MAX_CONCURRENCY",
                defaults.reconciliation.max_concurrency,
            )?,
        };

        let config = Config {
            server,
            database,
            paypal,
            reconciliation,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        // Validate URLs are not empty
        if self.server.base_url.trim().is_empty() {
            return Err(anyhow!("BASE_URL cannot be empty"));
        }

        if self.paypal.base_url.trim().is_empty() {
            return Err(anyhow!("PAYPAL_API_URL cannot be empty"));
        }

        if self.paypal.timeout_secs == 0 {
            return Err(anyhow!("PAYPAL_TIMEOUT_SECS must be greater than 0"));
        }

        if self.reconciliation.max_concurrency == 0 {
            return Err(anyhow!("RECONCILE_MAX_CONCURRENCY must be greater than 0"));
        }

        // Validate database max connections
        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        Ok(())
    }
}
