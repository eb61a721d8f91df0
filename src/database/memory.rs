use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::PaymentStore;
use crate::payments::types::Payment;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory payment store.
///
/// Used when no database is configured, and in tests.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reference_taken(
        payments: &HashMap<Uuid, Payment>,
        id: Uuid,
        reference_id: Option<&str>,
    ) -> bool {
        match reference_id {
            None => false,
            Some(reference) => payments
                .values()
                .any(|p| p.id != id && p.reference_id.as_deref() == Some(reference)),
        }
    }

    fn duplicate_reference(reference_id: Option<&str>) -> DatabaseError {
        DatabaseError::new(DatabaseErrorKind::UniqueConstraintViolation {
            column: "reference_id".to_string(),
            value: reference_id.unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(DatabaseError::new(
                DatabaseErrorKind::UniqueConstraintViolation {
                    column: "id".to_string(),
                    value: payment.id.to_string(),
                },
            ));
        }
        if Self::reference_taken(&payments, payment.id, payment.reference_id.as_deref()) {
            return Err(Self::duplicate_reference(payment.reference_id.as_deref()));
        }
        payments.insert(payment.id, payment.clone());
        Ok(payment.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.reference_id.as_deref() == Some(reference_id))
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Payment>, DatabaseError> {
        let payments = self.payments.read().await;
        let mut all: Vec<Payment> = payments.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        let mut payments = self.payments.write().await;

        let stored_version = match payments.get(&payment.id) {
            Some(stored) => stored.version,
            None => {
                return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "Payment".to_string(),
                    id: payment.id.to_string(),
                }))
            }
        };
        if stored_version != payment.version {
            return Err(DatabaseError::version_conflict(
                "Payment",
                payment.id,
                payment.version,
            ));
        }
        if Self::reference_taken(&payments, payment.id, payment.reference_id.as_deref()) {
            return Err(Self::duplicate_reference(payment.reference_id.as_deref()));
        }

        let mut saved = payment.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        payments.insert(saved.id, saved.clone());
        Ok(saved)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{Currency, NewPayment, PaymentStatus};
    use rust_decimal_macros::dec;

    fn payment(name: &str) -> Payment {
        Payment::new(NewPayment {
            customer_name: name.to_string(),
            customer_email: "test@example.com".to_string(),
            amount: dec!(100.00),
            currency: Currency::Usd,
        })
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryPaymentStore::new();
        let inserted = store.insert(&payment("Test User")).await.unwrap();

        let mut next = inserted.clone();
        next.status = PaymentStatus::Failed;
        let saved = store.update(&next).await.unwrap();

        assert_eq!(saved.version, inserted.version + 1);
        assert!(saved.updated_at >= inserted.updated_at);
        let stored = store.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = InMemoryPaymentStore::new();
        let inserted = store.insert(&payment("Test User")).await.unwrap();

        let mut first = inserted.clone();
        first.status = PaymentStatus::Processing;
        store.update(&first).await.unwrap();

        let mut stale = inserted.clone();
        stale.status = PaymentStatus::Failed;
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_version_conflict());

        let stored = store.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_reference_must_be_unique() {
        let store = InMemoryPaymentStore::new();
        let mut a = store.insert(&payment("A")).await.unwrap();
        let mut b = store.insert(&payment("B")).await.unwrap();

        a.reference_id = Some("ORDER-1".to_string());
        store.update(&a).await.unwrap();

        b.reference_id = Some("ORDER-1".to_string());
        let err = store.update(&b).await.unwrap_err();
        assert!(err.is_constraint_violation());

        let found = store.find_by_reference("ORDER-1").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);
    }

    #[tokio::test]
    async fn test_missing_payment_lookups() {
        let store = InMemoryPaymentStore::new();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.find_by_reference("nope").await.unwrap().is_none());
        assert!(!store.exists(Uuid::new_v4()).await.unwrap());
        assert!(store.find_all().await.unwrap().is_empty());
    }
}
