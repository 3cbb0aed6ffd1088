//! Job types.

use chrono::{DateTime, Utc};
use common::RecordId;
use serde_json::Value;

/// A queued unit of work.
///
/// The payload carries only a reference to authoritative state (the raw
/// event id); handlers re-fetch everything else from the store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: RecordId,
    pub name: String,
    /// Idempotency key; duplicate enqueues with the same key collapse.
    pub key: String,
    pub payload: Value,
    /// Delivery attempts so far, counted at lease time.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, key: impl Into<String>, payload: Value) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            key: key.into(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A new logical job was created.
    Created(Job),
    /// A job with the same idempotency key is already pending or in flight.
    Duplicate(Job),
}

impl EnqueueOutcome {
    /// Returns true if a new job was created by this call.
    pub fn was_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }

    /// Borrows the job either way.
    pub fn job(&self) -> &Job {
        match self {
            EnqueueOutcome::Created(job) | EnqueueOutcome::Duplicate(job) => job,
        }
    }
}

/// Outcome of a nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// The job was returned to the queue for another attempt.
    Retried { attempt: u32 },
    /// Attempts are exhausted; the job moved to the dead-letter list.
    DeadLettered,
}

/// A job that exhausted its attempts, with the final error.
#[derive(Debug, Clone)]
pub struct DeadJob {
    pub job: Job,
    pub error: String,
}
