//! Pipeline status state machines.

use serde::{Deserialize, Serialize};

/// The status of an order record as it moves through the fulfillment pipeline.
///
/// Status transitions:
/// ```text
/// Processing ──► PendingWallet ──┬──► WalletProvisioned ──────────┐
///                                ├──► FailedWalletProvisioning ───┤
///                                └──► FailedNoPhoneForWallet ─────┤
///                                                                 ▼
///        ┌──► Completed
///        ├──► PartiallyCompleted
///        ├──► FailedUdiCreation
///        ├──► FailedUdiCreationError
///        └──► FailedPrerequisitesForUdi
/// ```
///
/// Every status reachable from the identity-creation stage is terminal.
/// A status never regresses to an earlier pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order record created, pipeline running.
    #[default]
    Processing,

    /// Wallet provisioning has been requested.
    PendingWallet,

    /// Wallet address and DID stored on the owning user.
    WalletProvisioned,

    /// Wallet provisioning failed; identity issuance still proceeds.
    FailedWalletProvisioning,

    /// The owning user has no phone number to provision a wallet against.
    FailedNoPhoneForWallet,

    /// Every purchased unit received a digital identity (terminal).
    Completed,

    /// Some units received identities, some failed (terminal).
    PartiallyCompleted,

    /// All units were attempted and none received an identity (terminal).
    FailedUdiCreation,

    /// Identity issuance itself raised an error (terminal).
    FailedUdiCreationError,

    /// A prerequisite (user, order, mirrored order) was missing (terminal).
    FailedPrerequisitesForUdi,
}

impl OrderStatus {
    /// Returns the pipeline stage this status belongs to.
    ///
    /// Stages are ordered; updates may only move to an equal or later stage.
    pub fn stage(&self) -> u8 {
        match self {
            OrderStatus::Processing => 0,
            OrderStatus::PendingWallet => 1,
            OrderStatus::WalletProvisioned
            | OrderStatus::FailedWalletProvisioning
            | OrderStatus::FailedNoPhoneForWallet => 2,
            OrderStatus::Completed
            | OrderStatus::PartiallyCompleted
            | OrderStatus::FailedUdiCreation
            | OrderStatus::FailedUdiCreationError
            | OrderStatus::FailedPrerequisitesForUdi => 3,
        }
    }

    /// Returns true if advancing from `self` to `next` does not regress a stage.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        next.stage() >= self.stage()
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.stage() == 3
    }

    /// Returns the status name as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::PendingWallet => "PENDING_WALLET",
            OrderStatus::WalletProvisioned => "WALLET_PROVISIONED",
            OrderStatus::FailedWalletProvisioning => "FAILED_WALLET_PROVISIONING",
            OrderStatus::FailedNoPhoneForWallet => "FAILED_NO_PHONE_FOR_WALLET",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
            OrderStatus::FailedUdiCreation => "FAILED_UDI_CREATION",
            OrderStatus::FailedUdiCreationError => "FAILED_UDI_CREATION_ERROR",
            OrderStatus::FailedPrerequisitesForUdi => "FAILED_PREREQUISITES_FOR_UDI",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "PROCESSING" => Some(OrderStatus::Processing),
            "PENDING_WALLET" => Some(OrderStatus::PendingWallet),
            "WALLET_PROVISIONED" => Some(OrderStatus::WalletProvisioned),
            "FAILED_WALLET_PROVISIONING" => Some(OrderStatus::FailedWalletProvisioning),
            "FAILED_NO_PHONE_FOR_WALLET" => Some(OrderStatus::FailedNoPhoneForWallet),
            "COMPLETED" => Some(OrderStatus::Completed),
            "PARTIALLY_COMPLETED" => Some(OrderStatus::PartiallyCompleted),
            "FAILED_UDI_CREATION" => Some(OrderStatus::FailedUdiCreation),
            "FAILED_UDI_CREATION_ERROR" => Some(OrderStatus::FailedUdiCreationError),
            "FAILED_PREREQUISITES_FOR_UDI" => Some(OrderStatus::FailedPrerequisitesForUdi),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a digital identity in its minting lifecycle.
///
/// Status transitions:
/// ```text
/// Created ──► MintPending ──┬──► Minted
///                           └──► MintFailed
/// ```
///
/// `MintPending` is written before any external mint call, so a crash
/// mid-mint leaves a visibly pending, re-triggerable record. It is also the
/// resting state when minting is not configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    /// Identity record created, minting not yet attempted.
    #[default]
    Created,

    /// A mint attempt has started (or minting is unconfigured).
    MintPending,

    /// Token minted on chain (terminal).
    Minted,

    /// All mint candidates failed (terminal).
    MintFailed,
}

impl IdentityStatus {
    /// Returns true if a mint attempt may be (re-)triggered from this status.
    pub fn can_mint(&self) -> bool {
        matches!(self, IdentityStatus::Created | IdentityStatus::MintPending)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IdentityStatus::Minted | IdentityStatus::MintFailed)
    }

    /// Returns the status name as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Created => "CREATED",
            IdentityStatus::MintPending => "MINT_PENDING",
            IdentityStatus::Minted => "MINTED",
            IdentityStatus::MintFailed => "MINT_FAILED",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<IdentityStatus> {
        match s {
            "CREATED" => Some(IdentityStatus::Created),
            "MINT_PENDING" => Some(IdentityStatus::MintPending),
            "MINTED" => Some(IdentityStatus::Minted),
            "MINT_FAILED" => Some(IdentityStatus::MintFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_processing() {
        assert_eq!(OrderStatus::default(), OrderStatus::Processing);
    }

    #[test]
    fn test_stage_ordering() {
        assert!(OrderStatus::Processing.stage() < OrderStatus::PendingWallet.stage());
        assert!(OrderStatus::PendingWallet.stage() < OrderStatus::WalletProvisioned.stage());
        assert!(OrderStatus::WalletProvisioned.stage() < OrderStatus::Completed.stage());
        assert_eq!(
            OrderStatus::WalletProvisioned.stage(),
            OrderStatus::FailedWalletProvisioning.stage()
        );
    }

    #[test]
    fn test_cannot_regress_stage() {
        assert!(OrderStatus::Processing.can_advance_to(OrderStatus::PendingWallet));
        assert!(OrderStatus::PendingWallet.can_advance_to(OrderStatus::WalletProvisioned));
        assert!(OrderStatus::WalletProvisioned.can_advance_to(OrderStatus::Completed));
        assert!(!OrderStatus::Completed.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::WalletProvisioned.can_advance_to(OrderStatus::PendingWallet));
    }

    #[test]
    fn test_wallet_retry_may_overwrite_wallet_failure() {
        // A reclaimed job that retries wallet provisioning may replace the
        // failure outcome within the same stage.
        assert!(
            OrderStatus::FailedWalletProvisioning.can_advance_to(OrderStatus::WalletProvisioned)
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::PendingWallet.is_terminal());
        assert!(!OrderStatus::WalletProvisioned.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::PartiallyCompleted.is_terminal());
        assert!(OrderStatus::FailedUdiCreation.is_terminal());
        assert!(OrderStatus::FailedUdiCreationError.is_terminal());
        assert!(OrderStatus::FailedPrerequisitesForUdi.is_terminal());
    }

    #[test]
    fn test_order_status_parse_roundtrip() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::PendingWallet,
            OrderStatus::WalletProvisioned,
            OrderStatus::FailedWalletProvisioning,
            OrderStatus::FailedNoPhoneForWallet,
            OrderStatus::Completed,
            OrderStatus::PartiallyCompleted,
            OrderStatus::FailedUdiCreation,
            OrderStatus::FailedUdiCreationError,
            OrderStatus::FailedPrerequisitesForUdi,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_identity_can_mint() {
        assert!(IdentityStatus::Created.can_mint());
        assert!(IdentityStatus::MintPending.can_mint());
        assert!(!IdentityStatus::Minted.can_mint());
        assert!(!IdentityStatus::MintFailed.can_mint());
    }

    #[test]
    fn test_identity_terminal_statuses() {
        assert!(!IdentityStatus::Created.is_terminal());
        assert!(!IdentityStatus::MintPending.is_terminal());
        assert!(IdentityStatus::Minted.is_terminal());
        assert!(IdentityStatus::MintFailed.is_terminal());
    }

    #[test]
    fn test_status_serialization_matches_persisted_names() {
        let json = serde_json::to_string(&OrderStatus::PendingWallet).unwrap();
        assert_eq!(json, "\"PENDING_WALLET\"");
        let json = serde_json::to_string(&IdentityStatus::MintPending).unwrap();
        assert_eq!(json, "\"MINT_PENDING\"");
    }
}
