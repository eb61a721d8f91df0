use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::PaymentStore;
use crate::payments::types::Payment;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, reference_id, customer_name, customer_email, amount, currency, \
     status, gateway_response, approval_url, version, created_at, updated_at";

const CREATE_PAYMENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS payments (
    id UUID PRIMARY KEY,
    reference_id VARCHAR(100) UNIQUE,
    customer_name VARCHAR(100) NOT NULL,
    customer_email VARCHAR(254) NOT NULL,
    amount NUMERIC(10, 2) NOT NULL CHECK (amount > 0),
    currency VARCHAR(3) NOT NULL DEFAULT 'USD',
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    gateway_response JSONB,
    approval_url TEXT,
    version BIGINT NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS payments_created_at_idx ON payments (created_at DESC)";

/// Row shape of the `payments` table
#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    reference_id: Option<String>,
    customer_name: String,
    customer_email: String,
    amount: Decimal,
    currency: String,
    status: String,
    gateway_response: Option<serde_json::Value>,
    approval_url: Option<String>,
    version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            reference_id: row.reference_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            amount: row.amount,
            currency: row
                .currency
                .parse()
                .map_err(|e: String| DatabaseError::corrupt_record(e).with_context(row.id.to_string()))?,
            status: row
                .status
                .parse()
                .map_err(|e: String| DatabaseError::corrupt_record(e).with_context(row.id.to_string()))?,
            gateway_response: row.gateway_response,
            approval_url: row.approval_url,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed payment store
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `payments` table and its indexes if they are missing
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        sqlx::query(CREATE_PAYMENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        sqlx::query(CREATE_CREATED_AT_INDEX)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        info!("payments schema ready");
        Ok(())
    }

    fn into_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, DatabaseError> {
        rows.into_iter().map(Payment::try_from).collect()
    }
}

#[async_trait]
impl PaymentStore for PgPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {}",
            PAYMENT_COLUMNS, PAYMENT_COLUMNS
        ))
        .bind(payment.id)
        .bind(&payment.reference_id)
        .bind(&payment.customer_name)
        .bind(&payment.customer_email)
        .bind(payment.amount)
        .bind(payment.currency.code())
        .bind(payment.status.as_str())
        .bind(&payment.gateway_response)
        .bind(&payment.approval_url)
        .bind(payment.version)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn find_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE reference_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn find_all(&self) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Self::into_payments(rows)
    }

    async fn update(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        // Identity, customer and amount columns are immutable and never written here.
        // COALESCE keeps an already assigned reference id from being cleared.
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments \
             SET reference_id = COALESCE(reference_id, $1), status = $2, gateway_response = $3, \
                 approval_url = $4, version = version + 1, updated_at = NOW() \
             WHERE id = $5 AND version = $6 \
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(&payment.reference_id)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_response)
        .bind(&payment.approval_url)
        .bind(payment.id)
        .bind(payment.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => row.try_into(),
            None if self.exists(payment.id).await? => Err(DatabaseError::version_conflict(
                "Payment",
                payment.id,
                payment.version,
            )),
            None => Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Payment".to_string(),
                id: payment.id.to_string(),
            })),
        }
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
