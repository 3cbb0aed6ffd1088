use async_trait::async_trait;
use common::RecordId;
use serde_json::Value;

use crate::Result;
use crate::job::{EnqueueOutcome, Job, NackOutcome};

/// Core trait for job queue implementations.
///
/// Delivery is at-least-once: a leased job whose worker neither acks nor
/// nacks within the stall threshold is reclaimed and re-delivered, possibly
/// while the original worker is still running. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job unless one with the same idempotency key is already
    /// pending or leased.
    async fn enqueue(
        &self,
        name: &str,
        payload: Value,
        idempotency_key: &str,
    ) -> Result<EnqueueOutcome>;

    /// Leases the next pending job, if any.
    ///
    /// Leasing counts a delivery attempt. Stalled leases are reclaimed
    /// before the next job is handed out.
    async fn lease(&self) -> Result<Option<Job>>;

    /// Acknowledges successful completion of a leased job.
    async fn ack(&self, job_id: RecordId) -> Result<()>;

    /// Reports failure of a leased job.
    ///
    /// The job is re-queued until its attempts are exhausted, then moved to
    /// the dead-letter list with the final error.
    async fn nack(&self, job_id: RecordId, error: &str) -> Result<NackOutcome>;

    /// Returns stalled leases to the pending queue; returns how many.
    async fn reclaim_stalled(&self) -> Result<usize>;
}

// Delegation so the queue can be shared between the intake path and the
// worker pool behind an `Arc`.
#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for std::sync::Arc<T> {
    async fn enqueue(
        &self,
        name: &str,
        payload: Value,
        idempotency_key: &str,
    ) -> Result<EnqueueOutcome> {
        (**self).enqueue(name, payload, idempotency_key).await
    }

    async fn lease(&self) -> Result<Option<Job>> {
        (**self).lease().await
    }

    async fn ack(&self, job_id: RecordId) -> Result<()> {
        (**self).ack(job_id).await
    }

    async fn nack(&self, job_id: RecordId, error: &str) -> Result<NackOutcome> {
        (**self).nack(job_id, error).await
    }

    async fn reclaim_stalled(&self) -> Result<usize> {
        (**self).reclaim_stalled().await
    }
}
