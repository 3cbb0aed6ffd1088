//! Wallet provisioning trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::RecordId;

use crate::error::SagaError;

/// A provisioned wallet: on-chain address plus decentralized identifier.
#[derive(Debug, Clone)]
pub struct WalletGrant {
    pub address: String,
    pub did: String,
}

/// Trait for wallet/identity provisioning services.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Ensures a wallet exists for the given user, creating one if needed.
    async fn ensure_wallet(
        &self,
        user_id: RecordId,
        contact_handle: &str,
    ) -> Result<WalletGrant, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryWalletState {
    wallets: HashMap<RecordId, WalletGrant>,
    next_id: u32,
    fail_on_provision: bool,
}

/// In-memory wallet service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletService {
    state: Arc<RwLock<InMemoryWalletState>>,
}

impl InMemoryWalletService {
    /// Creates a new in-memory wallet service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on the next provisioning call.
    pub fn set_fail_on_provision(&self, fail: bool) {
        self.state.write().unwrap().fail_on_provision = fail;
    }

    /// Returns the number of provisioned wallets.
    pub fn wallet_count(&self) -> usize {
        self.state.read().unwrap().wallets.len()
    }
}

#[async_trait]
impl WalletService for InMemoryWalletService {
    async fn ensure_wallet(
        &self,
        user_id: RecordId,
        _contact_handle: &str,
    ) -> Result<WalletGrant, SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_provision {
            return Err(SagaError::Wallet("provisioning service unavailable".into()));
        }

        if let Some(existing) = state.wallets.get(&user_id) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let grant = WalletGrant {
            address: format!("0x{:040x}", state.next_id),
            did: format!("did:ethr:0x{:040x}", state.next_id),
        };
        state.wallets.insert(user_id, grant.clone());
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_wallet_is_idempotent_per_user() {
        let service = InMemoryWalletService::new();
        let user_id = RecordId::new();

        let first = service.ensure_wallet(user_id, "+15550001111").await.unwrap();
        let second = service.ensure_wallet(user_id, "+15550001111").await.unwrap();

        assert_eq!(first.address, second.address);
        assert_eq!(first.did, second.did);
        assert_eq!(service.wallet_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_users_get_distinct_wallets() {
        let service = InMemoryWalletService::new();
        let a = service.ensure_wallet(RecordId::new(), "+1555").await.unwrap();
        let b = service.ensure_wallet(RecordId::new(), "+1556").await.unwrap();
        assert_ne!(a.address, b.address);
    }

    #[tokio::test]
    async fn test_fail_on_provision() {
        let service = InMemoryWalletService::new();
        service.set_fail_on_provision(true);

        let result = service.ensure_wallet(RecordId::new(), "+1555").await;
        assert!(matches!(result, Err(SagaError::Wallet(_))));
        assert_eq!(service.wallet_count(), 0);
    }
}
