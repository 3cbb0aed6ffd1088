//! Queue error types.

use common::RecordId;
use thiserror::Error;

/// Errors that can occur at the queue boundary.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The job is not currently leased, so it cannot be acked or nacked.
    #[error("job {0} is not leased")]
    NotLeased(RecordId),
}

/// Convenience type alias for queue results.
pub type Result<T> = std::result::Result<T, QueueError>;
