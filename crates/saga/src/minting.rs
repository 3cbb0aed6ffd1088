//! Minting coordinator: drives a digital identity through its minting
//! state machine against the chain-minting service.

use chrono::Utc;
use domain::{DigitalIdentity, IdentityStatus};
use store::PipelineStore;

use crate::error::{Result, SagaError};
use crate::services::minting::{MintMethod, MintReceipt, MintingService};

/// Minting configuration shared by the coordinator and the issuer.
#[derive(Debug, Clone)]
pub struct MintingConfig {
    /// Base URL for token metadata; the identity id is appended.
    pub metadata_base_url: String,
    /// Process-wide contract fallback when a variant carries none.
    pub fallback_contract_address: Option<String>,
}

impl MintingConfig {
    /// Builds the metadata URL for one identity.
    pub fn metadata_url(&self, identity: &DigitalIdentity) -> String {
        format!(
            "{}/token-metadata/{}",
            self.metadata_base_url.trim_end_matches('/'),
            identity.id
        )
    }
}

/// Outcome of a mint attempt. The outcome has already been persisted when
/// it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    /// Minted on chain; receipt persisted.
    Minted(MintReceipt),
    /// Minting credentials absent; identity left at `MintPending`.
    NotConfigured,
    /// All candidates (or a preflight check) failed; identity at `MintFailed`.
    Failed(String),
}

/// Drives identity records through `Created → MintPending → {Minted | MintFailed}`.
pub struct MintingCoordinator<S, M>
where
    S: PipelineStore,
    M: MintingService,
{
    store: S,
    minting: M,
    config: MintingConfig,
}

impl<S, M> MintingCoordinator<S, M>
where
    S: PipelineStore,
    M: MintingService,
{
    /// Creates a new minting coordinator.
    pub fn new(store: S, minting: M, config: MintingConfig) -> Self {
        Self {
            store,
            minting,
            config,
        }
    }

    /// Returns the minting configuration.
    pub fn config(&self) -> &MintingConfig {
        &self.config
    }

    /// Mints one identity, persisting every transition.
    ///
    /// The `MintPending` transition is written before any external call, so
    /// a crash mid-mint leaves a visibly pending, re-triggerable record.
    /// Only store faults on the happy path propagate; mint failure never
    /// crashes the caller.
    #[tracing::instrument(skip(self, identity), fields(identity_id = %identity.id))]
    pub async fn mint_identity(&self, identity: &DigitalIdentity) -> Result<MintOutcome> {
        self.store
            .set_identity_status(identity.id, IdentityStatus::MintPending)
            .await?;

        if !self.minting.is_configured() {
            tracing::info!(identity_id = %identity.id, "minting not configured, leaving identity pending");
            return Ok(MintOutcome::NotConfigured);
        }

        let (recipient, contract) = match self.preflight(identity).await {
            Ok(prepared) => prepared,
            Err(e) => {
                let message = e.to_string();
                self.record_failure(identity, &message).await;
                return Ok(MintOutcome::Failed(message));
            }
        };

        let metadata_url = self.config.metadata_url(identity);

        let mut last_error: Option<SagaError> = None;
        for method in MintMethod::CANDIDATES {
            match self
                .minting
                .mint(method, &contract, &recipient, &metadata_url)
                .await
            {
                Ok(receipt) => {
                    self.store
                        .record_mint_success(
                            identity.id,
                            &receipt.token_id,
                            &receipt.transaction_hash,
                            &contract,
                            Utc::now(),
                        )
                        .await?;
                    metrics::counter!("identities_minted_total").increment(1);
                    tracing::info!(
                        identity_id = %identity.id,
                        %method,
                        token_id = %receipt.token_id,
                        "identity minted"
                    );
                    return Ok(MintOutcome::Minted(receipt));
                }
                Err(e) => {
                    tracing::warn!(identity_id = %identity.id, %method, error = %e, "mint candidate failed");
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no mint candidates available".to_string());
        self.record_failure(identity, &message).await;
        Ok(MintOutcome::Failed(message))
    }

    /// Resolves the recipient wallet and contract address, raising a
    /// configuration error when either is missing.
    async fn preflight(&self, identity: &DigitalIdentity) -> Result<(String, String)> {
        let owner = self.store.get_user(identity.user_id).await?;
        let recipient = owner
            .and_then(|u| u.wallet_address)
            .or_else(|| identity.owner_address.clone())
            .ok_or_else(|| {
                SagaError::MintPrerequisite(format!(
                    "no recipient wallet for identity {}",
                    identity.id
                ))
            })?;

        let contract = if identity.contract_address.is_empty() {
            self.config
                .fallback_contract_address
                .clone()
                .ok_or_else(|| {
                    SagaError::MintPrerequisite(format!(
                        "no contract address for identity {}",
                        identity.id
                    ))
                })?
        } else {
            identity.contract_address.clone()
        };

        Ok((recipient, contract))
    }

    /// Records a `MintFailed` outcome. Persistence errors here are logged
    /// and swallowed so a failed mint cannot crash the issuing batch.
    async fn record_failure(&self, identity: &DigitalIdentity, message: &str) {
        metrics::counter!("identities_mint_failed_total").increment(1);
        if let Err(e) = self.store.record_mint_failure(identity.id, message).await {
            tracing::error!(
                identity_id = %identity.id,
                error = %e,
                "failed to persist mint failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::minting::InMemoryMintingService;
    use common::RecordId;
    use domain::{OrderRecord, OrderStatus, PlatformUser};
    use store::InMemoryStore;

    fn config() -> MintingConfig {
        MintingConfig {
            metadata_base_url: "https://assets.example.com".into(),
            fallback_contract_address: Some("0xfallback".into()),
        }
    }

    async fn seed_identity(
        store: &InMemoryStore,
        contract: &str,
        with_wallet: bool,
    ) -> DigitalIdentity {
        let now = Utc::now();
        let mut user = PlatformUser {
            id: RecordId::new(),
            phone: "+15550001111".into(),
            customer_id: None,
            display_name: None,
            wallet_address: None,
            wallet_did: None,
            created_at: now,
        };
        if with_wallet {
            user.wallet_address = Some("0xowner".into());
            user.wallet_did = Some("did:ethr:0xowner".into());
        }
        let user = store.find_or_create_user(user).await.unwrap().into_inner();

        let order = store
            .find_or_create_order(OrderRecord {
                id: RecordId::new(),
                user_id: user.id,
                external_order_id: 1001,
                status: OrderStatus::Processing,
                total_items: 1,
                notification_sent_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
            .into_inner();

        let identity = DigitalIdentity {
            id: RecordId::new(),
            variant_id: RecordId::new(),
            user_id: user.id,
            order_id: order.id,
            shop: "shop.example.com".into(),
            line_item_external_id: 456789,
            unit_key: "456789".into(),
            status: IdentityStatus::Created,
            contract_address: contract.into(),
            token_id: None,
            transaction_hash: None,
            minted_at: None,
            owner_address: user.wallet_address.clone(),
            owner_did: user.wallet_did.clone(),
            mint_error: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_identity(identity).await.unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_first_candidate_success_mints() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "0xabc", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert!(matches!(outcome, MintOutcome::Minted(_)));

        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IdentityStatus::Minted);
        assert!(stored.minted_at.is_some());
        assert_eq!(minting.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_to_second_candidate() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        minting.set_fail_method(MintMethod::MintToWithUri, true);
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "0xabc", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        let MintOutcome::Minted(receipt) = outcome else {
            panic!("expected mint success");
        };

        // Only the fallback candidate's transaction is stored.
        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IdentityStatus::Minted);
        assert_eq!(stored.transaction_hash.as_deref(), Some(receipt.transaction_hash.as_str()));
        assert_eq!(minting.call_count(), 2);
        assert_eq!(minting.calls()[1].method, MintMethod::SafeMint);
    }

    #[tokio::test]
    async fn test_all_candidates_fail_marks_mint_failed() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        minting.set_fail_method(MintMethod::MintToWithUri, true);
        minting.set_fail_method(MintMethod::SafeMint, true);
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "0xabc", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert!(matches!(outcome, MintOutcome::Failed(_)));

        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IdentityStatus::MintFailed);
        assert!(stored.mint_error.is_some());
    }

    #[tokio::test]
    async fn test_unconfigured_leaves_identity_pending_without_calls() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        minting.set_configured(false);
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "0xabc", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert_eq!(outcome, MintOutcome::NotConfigured);

        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IdentityStatus::MintPending);
        assert_eq!(minting.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_wallet_is_mint_failed_not_a_crash() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "0xabc", false).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert!(matches!(outcome, MintOutcome::Failed(_)));

        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IdentityStatus::MintFailed);
        assert!(stored.mint_error.unwrap().contains("no recipient wallet"));
        assert_eq!(minting.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_contract_uses_process_fallback() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config());
        let identity = seed_identity(&store, "", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert!(matches!(outcome, MintOutcome::Minted(_)));
        assert_eq!(minting.calls()[0].contract_address, "0xfallback");

        let stored = store.get_identity(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.contract_address, "0xfallback");
    }

    #[tokio::test]
    async fn test_no_contract_anywhere_is_mint_failed() {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        let mut cfg = config();
        cfg.fallback_contract_address = None;
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), cfg);
        let identity = seed_identity(&store, "", true).await;

        let outcome = coordinator.mint_identity(&identity).await.unwrap();
        assert!(matches!(outcome, MintOutcome::Failed(_)));
        assert_eq!(minting.call_count(), 0);
    }

    #[test]
    fn test_metadata_url_shape() {
        let cfg = MintingConfig {
            metadata_base_url: "https://assets.example.com/".into(),
            fallback_contract_address: None,
        };
        let now = Utc::now();
        let identity = DigitalIdentity {
            id: RecordId::new(),
            variant_id: RecordId::new(),
            user_id: RecordId::new(),
            order_id: RecordId::new(),
            shop: "s".into(),
            line_item_external_id: 1,
            unit_key: "1".into(),
            status: IdentityStatus::Created,
            contract_address: String::new(),
            token_id: None,
            transaction_hash: None,
            minted_at: None,
            owner_address: None,
            owner_did: None,
            mint_error: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            cfg.metadata_url(&identity),
            format!("https://assets.example.com/token-metadata/{}", identity.id)
        );
    }
}
