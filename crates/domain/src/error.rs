//! Domain error types.

use thiserror::Error;

/// Errors produced while interpreting an inbound commerce event.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The payload is not a non-empty structured document of the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload carries no numeric external order id.
    #[error("payload has no numeric external order id")]
    MissingOrderId,
}
