//! Payment lifecycle engine
//!
//! Drives a payment from `pending` through gateway order creation, capture and
//! verification. All writes go through [`PaymentLifecycle::apply`], which
//! re-reads and re-applies a transition when another writer updated the same
//! record first, so concurrent reconciliation and capture never clobber each other.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::repository::PaymentStore;
use crate::error::{AppError, AppResult};
use crate::payments::reconciliation::ReconciliationScheduler;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    GatewayOrderStatus, NewPayment, OrderRequest, Payment, PaymentStatus, RedirectUrls,
};

/// Attempts per write before giving up on a contended record
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Result of a successful payment initiation
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub payment: Payment,
    pub approval_url: String,
}

pub struct PaymentLifecycle {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    scheduler: ReconciliationScheduler,
    redirect_urls: RedirectUrls,
}

impl PaymentLifecycle {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        scheduler: ReconciliationScheduler,
        redirect_urls: RedirectUrls,
    ) -> Self {
        Self {
            gateway,
            store,
            scheduler,
            redirect_urls,
        }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn ping_store(&self) -> AppResult<()> {
        self.store.ping().await.map_err(AppError::from)
    }

    /// Persist a new payment and open a gateway order for it.
    ///
    /// If the gateway rejects the order, or the accepted order cannot be
    /// recorded, the payment is marked `failed` and the error is returned; it
    /// never stays `pending`.
    pub async fn initiate(&self, input: NewPayment) -> AppResult<InitiatedPayment> {
        let payment = self.store.insert(&Payment::new(input)).await?;
        info!(
            payment_id = %payment.id,
            amount = %payment.amount,
            currency = %payment.currency,
            "Payment created"
        );

        let request = OrderRequest::for_payment(&payment, &self.redirect_urls);
        let order = match self.gateway.create_order(&request).await {
            Ok(order) => order,
            Err(gateway_error) => {
                error!(
                    payment_id = %payment.id,
                    error = %gateway_error,
                    retryable = gateway_error.is_retryable(),
                    "Payment initiation failed"
                );
                self.mark_failed(payment.id).await;
                return Err(gateway_error.into());
            }
        };

        let payment_id = payment.id;
        let payment = match self
            .apply(payment, |p| p.record_order(&order).map(|_| true))
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                error!(
                    payment_id = %payment_id,
                    reference_id = %order.order_id,
                    error = %e,
                    "Gateway order created but not recorded; order is orphaned"
                );
                self.mark_failed(payment_id).await;
                return Err(e);
            }
        };
        info!(
            payment_id = %payment.id,
            reference_id = %order.order_id,
            "Payment processing; awaiting customer approval"
        );

        self.scheduler.schedule(payment.id);

        Ok(InitiatedPayment {
            payment,
            approval_url: order.approval_url,
        })
    }

    /// Load a payment, reconciling it with the gateway first if it is not terminal.
    ///
    /// Reconciliation problems are logged and the stored record is returned as is.
    pub async fn get_payment(&self, id: Uuid) -> AppResult<Payment> {
        let payment = self.store.find_by_id(id).await?.ok_or(AppError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        match self.reconcile(payment.clone()).await {
            Ok(reconciled) => Ok(reconciled),
            Err(e) => {
                warn!(payment_id = %id, error = %e, "On-demand reconciliation failed; returning stored status");
                Ok(payment)
            }
        }
    }

    pub async fn list_payments(&self) -> AppResult<Vec<Payment>> {
        Ok(self.store.find_all().await?)
    }

    /// Reconcile the payment with the given id, if it still exists.
    pub async fn reconcile_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        match self.store.find_by_id(id).await? {
            Some(payment) => self.reconcile(payment).await.map(Some),
            None => Ok(None),
        }
    }

    /// Apply the gateway's view of the order to a non-terminal payment.
    ///
    /// Gateway failures leave the payment untouched and are not returned;
    /// only store failures surface as errors. Terminal payments are never read
    /// from the gateway, so repeated calls cannot regress them.
    pub async fn reconcile(&self, payment: Payment) -> AppResult<Payment> {
        if payment.status.is_terminal() {
            debug!(payment_id = %payment.id, status = %payment.status, "Payment already final; nothing to reconcile");
            return Ok(payment);
        }

        let order_id = match payment.reference_id.clone() {
            Some(order_id) => order_id,
            None => {
                debug!(payment_id = %payment.id, "Payment has no gateway order yet; nothing to reconcile");
                return Ok(payment);
            }
        };

        let raw = match self.gateway.fetch_order_status(&order_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    payment_id = %payment.id,
                    reference_id = %order_id,
                    error = %e,
                    "Payment verification failed; keeping local status"
                );
                return Ok(payment);
            }
        };

        let gateway_status = GatewayOrderStatus::from_raw(&raw);
        let target = gateway_status.local_status();
        let previous = payment.status;

        let payment = self
            .apply(payment, |p| {
                // Another writer may have finalized the payment since it was read.
                if p.status.is_terminal() {
                    return Ok(false);
                }
                if let Some(next) = target {
                    p.transition_to(next)?;
                }
                p.gateway_response = Some(raw.clone());
                Ok(true)
            })
            .await?;

        if payment.status != previous {
            info!(
                payment_id = %payment.id,
                reference_id = %order_id,
                gateway_status = ?gateway_status,
                from = %previous,
                to = %payment.status,
                "Payment reconciled"
            );
        } else {
            debug!(payment_id = %payment.id, gateway_status = ?gateway_status, "Payment status unchanged after reconciliation");
        }

        Ok(payment)
    }

    /// Capture the order behind the payment whose gateway reference is `reference_id`.
    pub async fn capture_by_reference(&self, reference_id: &str) -> AppResult<Payment> {
        let payment = self
            .store
            .find_by_reference(reference_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.capture(payment).await
    }

    /// Capture the payment's gateway order and mark it `completed`.
    ///
    /// Capturing an already completed payment is a no-op. On gateway failure
    /// the error is returned and the payment is left as it was.
    pub async fn capture(&self, payment: Payment) -> AppResult<Payment> {
        match payment.status {
            PaymentStatus::Completed => {
                info!(payment_id = %payment.id, "Payment already completed; capture skipped");
                return Ok(payment);
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(AppError::InvalidTransition {
                    payment_id: payment.id,
                    from: payment.status,
                    to: PaymentStatus::Completed,
                });
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let order_id = payment
            .reference_id
            .clone()
            .ok_or(AppError::CaptureTargetMissing {
                payment_id: payment.id,
            })?;

        let raw = self.gateway.capture_order(&order_id).await.map_err(|e| {
            error!(
                payment_id = %payment.id,
                reference_id = %order_id,
                error = %e,
                retryable = e.is_retryable(),
                "Payment capture failed"
            );
            AppError::from(e)
        })?;

        let payment_id = payment.id;
        let payment = self
            .apply(payment, |p| {
                p.transition_to(PaymentStatus::Completed)?;
                p.gateway_response = Some(raw.clone());
                Ok(true)
            })
            .await
            .map_err(|e| {
                error!(
                    payment_id = %payment_id,
                    reference_id = %order_id,
                    error = %e,
                    capture_response = %raw,
                    "Order captured at gateway but local record could not be completed"
                );
                e
            })?;

        info!(payment_id = %payment.id, reference_id = %order_id, "Payment completed");
        Ok(payment)
    }

    /// Mark the payment whose gateway reference is `reference_id` as `failed`
    /// after the customer abandoned the approval.
    pub async fn cancel_by_reference(&self, reference_id: &str) -> AppResult<Payment> {
        let payment = self
            .store
            .find_by_reference(reference_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let payment = self
            .apply(payment, |p| p.transition_to(PaymentStatus::Failed))
            .await?;
        info!(payment_id = %payment.id, reference_id = %reference_id, "Payment cancelled by customer");
        Ok(payment)
    }

    /// Best-effort move of a stored payment to `failed` after initiation broke off.
    async fn mark_failed(&self, payment_id: Uuid) {
        let result = match self.store.find_by_id(payment_id).await {
            Ok(Some(payment)) => self
                .apply(payment, |p| p.transition_to(PaymentStatus::Failed))
                .await
                .map(|_| ()),
            Ok(None) => Err(AppError::NotFound),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            error!(payment_id = %payment_id, error = %e, "Could not mark payment failed");
        }
    }

    /// Apply `mutate` to the payment and persist it with an optimistic write.
    ///
    /// `mutate` returns whether it changed anything; unchanged records are not
    /// written. On a version conflict the record is re-read and `mutate` runs
    /// again against the fresh copy.
    async fn apply<F>(&self, mut current: Payment, mut mutate: F) -> AppResult<Payment>
    where
        F: FnMut(&mut Payment) -> AppResult<bool> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut next = current.clone();
            if !mutate(&mut next)? {
                return Ok(current);
            }

            match self.store.update(&next).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_version_conflict() => {
                    warn!(
                        payment_id = %current.id,
                        attempt,
                        "Payment changed concurrently; re-reading before retry"
                    );
                    current = self
                        .store
                        .find_by_id(current.id)
                        .await?
                        .ok_or(AppError::NotFound)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict {
            payment_id: current.id,
        })
    }
}
