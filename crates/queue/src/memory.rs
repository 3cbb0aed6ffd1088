use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::RecordId;
use serde_json::Value;

use crate::error::{QueueError, Result};
use crate::job::{DeadJob, EnqueueOutcome, Job, NackOutcome};
use crate::queue::JobQueue;

/// Tunables for the in-memory queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum delivery attempts before a job is dead-lettered.
    pub max_attempts: u32,
    /// Lease age after which a job is considered stalled.
    pub stall_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            stall_timeout: Duration::from_secs(60),
        }
    }
}

struct Lease {
    job: Job,
    leased_at: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    leased: HashMap<RecordId, Lease>,
    dead: Vec<DeadJob>,
    /// Keys of jobs that are pending or leased.
    active_keys: HashSet<String>,
}

/// In-memory job queue.
///
/// Single-process implementation of [`JobQueue`] with lease tracking and
/// lazy stalled-job reclamation on every lease call.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    config: QueueConfig,
    state: Arc<Mutex<QueueState>>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl InMemoryJobQueue {
    /// Creates a new queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Returns the number of pending jobs.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Returns the number of leased jobs.
    pub fn leased_len(&self) -> usize {
        self.state.lock().unwrap().leased.len()
    }

    /// Returns a copy of the dead-letter list.
    pub fn dead_letters(&self) -> Vec<DeadJob> {
        self.state.lock().unwrap().dead.clone()
    }

    fn reclaim_locked(state: &mut QueueState, stall_timeout: Duration) -> usize {
        let stalled: Vec<RecordId> = state
            .leased
            .iter()
            .filter(|(_, lease)| lease.leased_at.elapsed() >= stall_timeout)
            .map(|(id, _)| *id)
            .collect();
        let count = stalled.len();
        for id in stalled {
            if let Some(lease) = state.leased.remove(&id) {
                tracing::warn!(job_id = %id, key = %lease.job.key, "reclaiming stalled job");
                state.pending.push_back(lease.job);
            }
        }
        count
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        name: &str,
        payload: Value,
        idempotency_key: &str,
    ) -> Result<EnqueueOutcome> {
        let mut state = self.state.lock().unwrap();

        if state.active_keys.contains(idempotency_key) {
            let existing = state
                .pending
                .iter()
                .find(|j| j.key == idempotency_key)
                .cloned()
                .or_else(|| {
                    state
                        .leased
                        .values()
                        .find(|l| l.job.key == idempotency_key)
                        .map(|l| l.job.clone())
                });
            if let Some(job) = existing {
                return Ok(EnqueueOutcome::Duplicate(job));
            }
        }

        let job = Job::new(name, idempotency_key, payload);
        state.active_keys.insert(idempotency_key.to_string());
        state.pending.push_back(job.clone());
        Ok(EnqueueOutcome::Created(job))
    }

    async fn lease(&self) -> Result<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        Self::reclaim_locked(&mut state, self.config.stall_timeout);

        let Some(mut job) = state.pending.pop_front() else {
            return Ok(None);
        };
        job.attempts += 1;
        state.leased.insert(
            job.id,
            Lease {
                job: job.clone(),
                leased_at: Instant::now(),
            },
        );
        Ok(Some(job))
    }

    async fn ack(&self, job_id: RecordId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let lease = state
            .leased
            .remove(&job_id)
            .ok_or(QueueError::NotLeased(job_id))?;
        state.active_keys.remove(&lease.job.key);
        Ok(())
    }

    async fn nack(&self, job_id: RecordId, error: &str) -> Result<NackOutcome> {
        let mut state = self.state.lock().unwrap();
        let lease = state
            .leased
            .remove(&job_id)
            .ok_or(QueueError::NotLeased(job_id))?;

        if lease.job.attempts >= self.config.max_attempts {
            state.active_keys.remove(&lease.job.key);
            state.dead.push(DeadJob {
                job: lease.job,
                error: error.to_string(),
            });
            return Ok(NackOutcome::DeadLettered);
        }

        let attempt = lease.job.attempts;
        state.pending.push_back(lease.job);
        Ok(NackOutcome::Retried { attempt })
    }

    async fn reclaim_stalled(&self) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::reclaim_locked(&mut state, self.config.stall_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_with(max_attempts: u32, stall: Duration) -> InMemoryJobQueue {
        InMemoryJobQueue::new(QueueConfig {
            max_attempts,
            stall_timeout: stall,
        })
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_by_key() {
        let queue = InMemoryJobQueue::default();

        let first = queue
            .enqueue("process-order", json!({"raw_event_id": "a"}), "order:shop:1001")
            .await
            .unwrap();
        assert!(first.was_created());

        let second = queue
            .enqueue("process-order", json!({"raw_event_id": "a"}), "order:shop:1001")
            .await
            .unwrap();
        assert!(!second.was_created());
        assert_eq!(second.job().id, first.job().id);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_allowed_again_after_ack() {
        let queue = InMemoryJobQueue::default();

        queue.enqueue("j", json!({}), "k").await.unwrap();
        let job = queue.lease().await.unwrap().unwrap();
        queue.ack(job.id).await.unwrap();

        let again = queue.enqueue("j", json!({}), "k").await.unwrap();
        assert!(again.was_created());
    }

    #[tokio::test]
    async fn test_lease_counts_attempts() {
        let queue = InMemoryJobQueue::default();
        queue.enqueue("j", json!({}), "k").await.unwrap();

        let job = queue.lease().await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);

        queue.nack(job.id, "boom").await.unwrap();
        let job = queue.lease().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn test_nack_retries_until_exhaustion_then_dead_letters() {
        let queue = queue_with(2, Duration::from_secs(60));
        queue.enqueue("j", json!({}), "k").await.unwrap();

        let job = queue.lease().await.unwrap().unwrap();
        assert_eq!(
            queue.nack(job.id, "first failure").await.unwrap(),
            NackOutcome::Retried { attempt: 1 }
        );

        let job = queue.lease().await.unwrap().unwrap();
        assert_eq!(
            queue.nack(job.id, "second failure").await.unwrap(),
            NackOutcome::DeadLettered
        );

        assert!(queue.lease().await.unwrap().is_none());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error, "second failure");
    }

    #[tokio::test]
    async fn test_stalled_lease_is_reclaimed() {
        let queue = queue_with(5, Duration::from_millis(0));
        queue.enqueue("j", json!({}), "k").await.unwrap();

        let job = queue.lease().await.unwrap().unwrap();
        // Zero stall threshold: the lease is immediately stalled.
        let reclaimed = queue.reclaim_stalled().await.unwrap();
        assert_eq!(reclaimed, 1);

        let redelivered = queue.lease().await.unwrap().unwrap();
        assert_eq!(redelivered.id, job.id);
        assert_eq!(redelivered.attempts, 2);
    }

    #[tokio::test]
    async fn test_ack_of_unleased_job_is_an_error() {
        let queue = InMemoryJobQueue::default();
        let result = queue.ack(RecordId::new()).await;
        assert!(matches!(result, Err(QueueError::NotLeased(_))));
    }

    #[tokio::test]
    async fn test_jobs_for_different_keys_are_independent() {
        let queue = InMemoryJobQueue::default();
        queue.enqueue("j", json!({}), "order:shop:1").await.unwrap();
        queue.enqueue("j", json!({}), "order:shop:2").await.unwrap();
        assert_eq!(queue.pending_len(), 2);
    }
}
