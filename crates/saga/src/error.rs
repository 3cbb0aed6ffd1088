//! Saga error types.

use common::RecordId;
use domain::DomainError;
use queue::QueueError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while processing a saga job.
///
/// Only a few of these ever abort a job: the rest are caught step-locally
/// and recorded as status transitions. An error that does propagate fails
/// the whole job and surfaces to the queue's retry policy.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The raw event referenced by the job no longer exists.
    #[error("raw event {0} not found")]
    EventNotFound(RecordId),

    /// The stored payload cannot be interpreted as an order event.
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] DomainError),

    /// A platform user could not be established for the buyer.
    #[error("cannot establish platform user: {0}")]
    UserResolution(String),

    /// Notification provider error.
    #[error("notification provider error: {0}")]
    Notification(String),

    /// Wallet provisioning error.
    #[error("wallet provisioning error: {0}")]
    Wallet(String),

    /// Chain-minting service error.
    #[error("minting service error: {0}")]
    Minting(String),

    /// A mint prerequisite (recipient wallet, contract address) is missing.
    #[error("missing mint prerequisite: {0}")]
    MintPrerequisite(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl SagaError {
    /// Returns true if the error can never be fixed by a queue retry
    /// (missing event, malformed payload, unresolvable user).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SagaError::EventNotFound(_)
                | SagaError::MalformedEvent(_)
                | SagaError::UserResolution(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
