//! Relational store boundary for the fulfillment pipeline.
//!
//! The store is the single source of truth: all pipeline components read and
//! write through [`PipelineStore`], which exposes idempotent upserts keyed by
//! natural business identifiers so concurrent retries of the same job are
//! safe. Two implementations are provided: an in-memory store for tests and
//! single-process runs, and a PostgreSQL store backed by sqlx.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{Inserted, PipelineStore};
