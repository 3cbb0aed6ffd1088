//! At-least-once job queue adapter.
//!
//! Provides the queue abstraction the saga worker runs on: enqueue with an
//! idempotency key (duplicate enqueues collapse to one logical job), lease
//! with a stall threshold, ack, nack with bounded retries, and dead-lettering
//! on exhaustion. Stalled leases become eligible for re-delivery, so job
//! handlers must be safely re-executable.

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;

pub use error::{QueueError, Result};
pub use job::{DeadJob, EnqueueOutcome, Job, NackOutcome};
pub use memory::{InMemoryJobQueue, QueueConfig};
pub use queue::JobQueue;
