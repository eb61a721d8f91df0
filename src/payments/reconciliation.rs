//! Deferred reconciliation of gateway orders
//!
//! Every order accepted by the gateway gets exactly one delayed status check
//! that runs on its own task, independent of the request that created it.
//! Checks are best-effort: failures are logged and never retried.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::payments::lifecycle::PaymentLifecycle;

pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// A single scheduled status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileJob {
    pub payment_id: Uuid,
    pub due: Instant,
}

/// Handle used by the lifecycle engine to schedule checks
#[derive(Debug, Clone)]
pub struct ReconciliationScheduler {
    sender: mpsc::UnboundedSender<ReconcileJob>,
    delay: Duration,
}

/// Receiving end of the scheduler, drained by [`ReconciliationWorker`]
#[derive(Debug)]
pub struct ReconciliationQueue {
    receiver: mpsc::UnboundedReceiver<ReconcileJob>,
}

impl ReconciliationScheduler {
    pub fn new(delay: Duration) -> (Self, ReconciliationQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, delay }, ReconciliationQueue { receiver })
    }

    /// Queue one check for `payment_id`, due after the configured delay.
    ///
    /// Returns false when no worker is listening anymore.
    pub fn schedule(&self, payment_id: Uuid) -> bool {
        let job = ReconcileJob {
            payment_id,
            due: Instant::now() + self.delay,
        };
        match self.sender.send(job) {
            Ok(()) => {
                debug!(payment_id = %payment_id, delay_ms = self.delay.as_millis() as u64, "Reconciliation scheduled");
                true
            }
            Err(_) => {
                warn!(payment_id = %payment_id, "Reconciliation worker is gone; check not scheduled");
                false
            }
        }
    }
}

impl ReconciliationQueue {
    pub async fn recv(&mut self) -> Option<ReconcileJob> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReconcileJob> {
        self.receiver.try_recv().ok()
    }
}

/// Runs scheduled checks with bounded concurrency
pub struct ReconciliationWorker {
    queue: ReconciliationQueue,
    lifecycle: Arc<PaymentLifecycle>,
    permits: Arc<Semaphore>,
}

impl ReconciliationWorker {
    pub fn new(
        queue: ReconciliationQueue,
        lifecycle: Arc<PaymentLifecycle>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!(
            max_concurrency = self.permits.available_permits(),
            "Reconciliation worker started"
        );

        while let Some(job) = self.queue.recv().await {
            let lifecycle = Arc::clone(&self.lifecycle);
            let permits = Arc::clone(&self.permits);
            tokio::spawn(run_job(job, lifecycle, permits));
        }

        info!("Reconciliation queue closed; worker stopping");
    }
}

async fn run_job(job: ReconcileJob, lifecycle: Arc<PaymentLifecycle>, permits: Arc<Semaphore>) {
    tokio::time::sleep_until(job.due).await;

    // Permits bound concurrent gateway calls, not the number of waiting timers.
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    match lifecycle.reconcile_by_id(job.payment_id).await {
        Ok(Some(payment)) => {
            info!(
                payment_id = %payment.id,
                status = %payment.status,
                "Scheduled reconciliation finished"
            );
        }
        Ok(None) => {
            info!(
                payment_id = %job.payment_id,
                "Payment no longer exists; skipping scheduled reconciliation"
            );
        }
        Err(e) => {
            error!(
                payment_id = %job.payment_id,
                error = %e,
                "Scheduled reconciliation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_enqueues_job_with_delay() {
        let (scheduler, mut queue) = ReconciliationScheduler::new(Duration::from_secs(2));
        let payment_id = Uuid::new_v4();
        let before = Instant::now();

        assert!(scheduler.schedule(payment_id));

        let job = queue.try_recv().unwrap();
        assert_eq!(job.payment_id, payment_id);
        assert!(job.due >= before + Duration::from_secs(2));
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_schedule_without_worker_reports_failure() {
        let (scheduler, queue) = ReconciliationScheduler::new(DEFAULT_RECONCILE_DELAY);
        drop(queue);
        assert!(!scheduler.schedule(Uuid::new_v4()));
    }
}
