//! Order-fulfillment saga for the event pipeline.
//!
//! One inbound order event drives a multi-step saga:
//! 1. Record the buyer (customer mirror and platform user)
//! 2. Send the order confirmation
//! 3. Provision a custodial wallet for the buyer
//! 4. Mirror the order and its line items
//! 5. Issue one digital identity per purchased unit
//! 6. Mint each identity on chain, with call-signature fallback
//!
//! Steps backed by external services record their failure in the order
//! status and let the saga continue; every step is idempotent so a retried
//! or reclaimed job converges on the same end state.

pub mod error;
pub mod intake;
pub mod issuer;
pub mod minting;
pub mod orchestrator;
pub mod services;
pub mod worker;

pub use error::{Result, SagaError};
pub use intake::{EventIntake, IntakeResult, SagaJobPayload, PROCESS_ORDER_JOB};
pub use issuer::{IdentityIssuer, IssueOutcome};
pub use minting::{MintOutcome, MintingConfig, MintingCoordinator};
pub use orchestrator::SagaOrchestrator;
pub use services::{
    InMemoryMintingService, InMemoryNotificationService, InMemoryWalletService, MintCall,
    MintMethod, MintReceipt, MintingService, NotificationReceipt, NotificationService, WalletGrant,
    WalletService,
};
pub use worker::WorkerPool;
