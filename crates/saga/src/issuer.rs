//! Per-unit digital identity issuance.
//!
//! Expands each mirrored line item into one identity per purchased unit,
//! inserts the identities idempotently, and hands freshly created or still
//! pending records to the minting coordinator.

use chrono::Utc;
use common::RecordId;
use domain::{DigitalIdentity, IdentityStatus, LineItemMirror, OrderRecord, PlatformUser};
use store::{Inserted, PipelineStore};

use crate::error::Result;
use crate::minting::MintingCoordinator;
use crate::services::minting::MintingService;

/// Aggregated result of issuing identities for one order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueOutcome {
    /// Units for which an identity record exists after this pass.
    pub created: u32,
    /// Units that could not be issued for lack of catalog prerequisites.
    pub failed: u32,
    /// The identity records, re-read after any mint attempt.
    pub issued: Vec<RecordId>,
}

/// Issues digital identities for an order's line items.
pub struct IdentityIssuer<S, M>
where
    S: PipelineStore + Clone,
    M: MintingService,
{
    store: S,
    minting: MintingCoordinator<S, M>,
}

impl<S, M> IdentityIssuer<S, M>
where
    S: PipelineStore + Clone,
    M: MintingService,
{
    /// Creates a new issuer sharing the store with its coordinator.
    pub fn new(store: S, minting: MintingCoordinator<S, M>) -> Self {
        Self { store, minting }
    }

    /// Issues one identity per purchased unit across all line items.
    ///
    /// Missing catalog prerequisites for one line item never abort the
    /// batch; the affected units are counted as failed and issuance moves
    /// on. Only store faults propagate.
    #[tracing::instrument(skip_all, fields(order_id = %order.id, items = line_items.len()))]
    pub async fn issue_for_order(
        &self,
        shop: &str,
        user: &PlatformUser,
        order: &OrderRecord,
        line_items: &[LineItemMirror],
    ) -> Result<IssueOutcome> {
        let mut outcome = IssueOutcome::default();

        for item in line_items {
            let units = item.quantity.max(1) as u32;

            let Some(variant_external_id) = item.variant_external_id else {
                tracing::warn!(
                    line_item = item.external_id,
                    "line item has no variant reference, skipping issuance"
                );
                outcome.failed += units;
                continue;
            };

            let Some(variant) = self.store.find_variant(shop, variant_external_id).await? else {
                tracing::warn!(
                    line_item = item.external_id,
                    variant = variant_external_id,
                    "no catalog variant for line item, skipping issuance"
                );
                outcome.failed += units;
                continue;
            };

            if variant.brand_id.is_none() {
                tracing::warn!(
                    line_item = item.external_id,
                    variant = variant_external_id,
                    "variant has no brand linkage, skipping issuance"
                );
                outcome.failed += units;
                continue;
            }

            for unit_index in 0..units {
                let unit_key = DigitalIdentity::unit_key(item.external_id, unit_index, units);
                let now = Utc::now();
                let candidate = DigitalIdentity {
                    id: RecordId::new(),
                    variant_id: variant.id,
                    user_id: user.id,
                    order_id: order.id,
                    shop: shop.to_string(),
                    line_item_external_id: item.external_id,
                    unit_key,
                    status: IdentityStatus::Created,
                    contract_address: variant.contract_address.clone().unwrap_or_default(),
                    token_id: None,
                    transaction_hash: None,
                    minted_at: None,
                    owner_address: user.wallet_address.clone(),
                    owner_did: user.wallet_did.clone(),
                    mint_error: None,
                    created_at: now,
                    updated_at: now,
                };

                let identity = match self.store.insert_identity(candidate).await? {
                    Inserted::Created(identity) => {
                        metrics::counter!("identities_issued_total").increment(1);
                        identity
                    }
                    Inserted::Existing(identity) => {
                        tracing::debug!(
                            identity_id = %identity.id,
                            unit_key = %identity.unit_key,
                            "identity already issued for unit"
                        );
                        identity
                    }
                };

                // A reprocessed order retries minting only for records the
                // chain has not settled yet.
                if identity.status.can_mint() {
                    self.minting.mint_identity(&identity).await?;
                }

                outcome.created += 1;
                outcome.issued.push(identity.id);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minting::MintingConfig;
    use crate::services::minting::{InMemoryMintingService, MintMethod};
    use domain::{OrderStatus, ProductVariant};
    use store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        minting: InMemoryMintingService,
        issuer: IdentityIssuer<InMemoryStore, InMemoryMintingService>,
        user: PlatformUser,
        order: OrderRecord,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let minting = InMemoryMintingService::new();
        let config = MintingConfig {
            metadata_base_url: "https://assets.example.com".into(),
            fallback_contract_address: None,
        };
        let coordinator = MintingCoordinator::new(store.clone(), minting.clone(), config);
        let issuer = IdentityIssuer::new(store.clone(), coordinator);

        let now = Utc::now();
        let user = store
            .find_or_create_user(PlatformUser {
                id: RecordId::new(),
                phone: "+15550001111".into(),
                customer_id: None,
                display_name: None,
                wallet_address: Some("0xowner".into()),
                wallet_did: Some("did:ethr:0xowner".into()),
                created_at: now,
            })
            .await
            .unwrap()
            .into_inner();
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

        Fixture {
            store,
            minting,
            issuer,
            user,
            order,
        }
    }

    async fn seed_variant(store: &InMemoryStore, external_id: i64, with_brand: bool) {
        store
            .upsert_variant(ProductVariant {
                id: RecordId::new(),
                shop: "shop.example.com".into(),
                external_id,
                sku: Some("SKU-1".into()),
                title: "Sneaker".into(),
                brand_id: with_brand.then(RecordId::new),
                contract_address: Some("0xabc".into()),
            })
            .await
            .unwrap();
    }

    fn line_item(external_id: i64, quantity: i32, variant: Option<i64>) -> LineItemMirror {
        LineItemMirror {
            id: RecordId::new(),
            order_mirror_id: RecordId::new(),
            external_id,
            title: "Sneaker".into(),
            sku: Some("SKU-1".into()),
            quantity,
            price: Some("120.00".into()),
            product_external_id: Some(9000),
            variant_external_id: variant,
        }
    }

    #[tokio::test]
    async fn test_quantity_expands_to_one_identity_per_unit() {
        let f = fixture().await;
        seed_variant(&f.store, 77, true).await;

        let outcome = f
            .issuer
            .issue_for_order(
                "shop.example.com",
                &f.user,
                &f.order,
                &[line_item(456789, 3, Some(77))],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.issued.len(), 3);

        let identities = f.store.identities_for_order(f.order.id).await.unwrap();
        let mut keys: Vec<_> = identities.iter().map(|i| i.unit_key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["456789#0", "456789#1", "456789#2"]);
        assert!(identities.iter().all(|i| i.status == IdentityStatus::Minted));
    }

    #[tokio::test]
    async fn test_reissue_is_idempotent_and_does_not_remint() {
        let f = fixture().await;
        seed_variant(&f.store, 77, true).await;
        let items = [line_item(456789, 2, Some(77))];

        let first = f
            .issuer
            .issue_for_order("shop.example.com", &f.user, &f.order, &items)
            .await
            .unwrap();
        let second = f
            .issuer
            .issue_for_order("shop.example.com", &f.user, &f.order, &items)
            .await
            .unwrap();

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 2);
        assert_eq!(f.store.identity_count().await, 2);
        // Minted identities are settled; the second pass makes no chain calls.
        assert_eq!(f.minting.call_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_identity_is_reminted_on_reprocess() {
        let f = fixture().await;
        seed_variant(&f.store, 77, true).await;
        f.minting.set_configured(false);
        let items = [line_item(456789, 1, Some(77))];

        f.issuer
            .issue_for_order("shop.example.com", &f.user, &f.order, &items)
            .await
            .unwrap();
        assert_eq!(f.minting.call_count(), 0);

        f.minting.set_configured(true);
        f.issuer
            .issue_for_order("shop.example.com", &f.user, &f.order, &items)
            .await
            .unwrap();
        assert_eq!(f.minting.call_count(), 1);

        let identities = f.store.identities_for_order(f.order.id).await.unwrap();
        assert_eq!(identities[0].status, IdentityStatus::Minted);
    }

    #[tokio::test]
    async fn test_missing_variant_counts_units_as_failed() {
        let f = fixture().await;
        seed_variant(&f.store, 77, true).await;

        let outcome = f
            .issuer
            .issue_for_order(
                "shop.example.com",
                &f.user,
                &f.order,
                &[
                    line_item(1, 2, Some(77)),
                    line_item(2, 3, Some(404)),
                    line_item(3, 1, None),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.failed, 4);
    }

    #[tokio::test]
    async fn test_variant_without_brand_is_not_issuable() {
        let f = fixture().await;
        seed_variant(&f.store, 77, false).await;

        let outcome = f
            .issuer
            .issue_for_order(
                "shop.example.com",
                &f.user,
                &f.order,
                &[line_item(456789, 2, Some(77))],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.failed, 2);
        assert_eq!(f.store.identity_count().await, 0);
    }

    #[tokio::test]
    async fn test_mint_failure_still_counts_identity_as_created() {
        let f = fixture().await;
        seed_variant(&f.store, 77, true).await;
        f.minting.set_fail_method(MintMethod::MintToWithUri, true);
        f.minting.set_fail_method(MintMethod::SafeMint, true);

        let outcome = f
            .issuer
            .issue_for_order(
                "shop.example.com",
                &f.user,
                &f.order,
                &[line_item(456789, 1, Some(77))],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.failed, 0);
        let identities = f.store.identities_for_order(f.order.id).await.unwrap();
        assert_eq!(identities[0].status, IdentityStatus::MintFailed);
    }
}
