//! Shared types used across the fulfillment pipeline crates.

pub mod types;

pub use types::RecordId;
