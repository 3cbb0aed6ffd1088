//! External service traits and in-memory implementations for saga steps.

pub mod minting;
pub mod notification;
pub mod wallet;

pub use minting::{InMemoryMintingService, MintCall, MintMethod, MintReceipt, MintingService};
pub use notification::{InMemoryNotificationService, NotificationReceipt, NotificationService};
pub use wallet::{InMemoryWalletService, WalletGrant, WalletService};
