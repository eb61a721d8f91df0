use crate::database::error::DatabaseError;
use crate::payments::types::Payment;
use async_trait::async_trait;
use uuid::Uuid;

/// Durable storage of payment records
///
/// Implementations provide read-after-write consistency per key. `update` is an
/// optimistic write: it only succeeds while the stored version still matches
/// the version the caller read.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment
    async fn insert(&self, payment: &Payment) -> Result<Payment, DatabaseError>;

    /// Find a payment by its primary key
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError>;

    /// Find a payment by its gateway order id
    async fn find_by_reference(&self, reference_id: &str)
        -> Result<Option<Payment>, DatabaseError>;

    /// All payments, newest first
    async fn find_all(&self) -> Result<Vec<Payment>, DatabaseError>;

    /// Persist `payment` if the stored version equals `payment.version`.
    ///
    /// Returns the stored record with its version bumped and `updated_at`
    /// refreshed, or a `VersionConflict` error when another writer got there first.
    async fn update(&self, payment: &Payment) -> Result<Payment, DatabaseError>;

    /// Check if a payment exists by id
    async fn exists(&self, id: Uuid) -> Result<bool, DatabaseError> {
        match self.find_by_id(id).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Verify the store is reachable
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Short name of the backing store, for health output
    fn backend(&self) -> &'static str;
}
