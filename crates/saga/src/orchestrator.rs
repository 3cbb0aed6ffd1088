//! The order saga: one queue job drives every step of fulfillment.
//!
//! Each step is idempotent, so a reprocessed job (retry or reclaimed stall)
//! converges on the same end state. Steps that depend on external services
//! record their failure in the order status and let processing continue; a
//! partly failed order is a first-class outcome, not an error.

use chrono::Utc;
use common::RecordId;
use domain::{
    Customer, LineItemMirror, OrderEvent, OrderMirror, OrderRecord, OrderStatus, PlatformUser,
    ResolvedOrder,
};
use queue::Job;
use store::{PipelineStore, StoreError};

use crate::error::{Result, SagaError};
use crate::intake::SagaJobPayload;
use crate::issuer::{IdentityIssuer, IssueOutcome};
use crate::services::minting::MintingService;
use crate::services::notification::NotificationService;
use crate::services::wallet::WalletService;

/// Runs the order-processing saga for one leased job.
pub struct SagaOrchestrator<S, N, W, M>
where
    S: PipelineStore + Clone,
    N: NotificationService,
    W: WalletService,
    M: MintingService,
{
    store: S,
    notification: N,
    wallet: W,
    issuer: IdentityIssuer<S, M>,
}

impl<S, N, W, M> SagaOrchestrator<S, N, W, M>
where
    S: PipelineStore + Clone,
    N: NotificationService,
    W: WalletService,
    M: MintingService,
{
    pub fn new(store: S, notification: N, wallet: W, issuer: IdentityIssuer<S, M>) -> Self {
        Self {
            store,
            notification,
            wallet,
            issuer,
        }
    }

    /// Processes one saga job end to end.
    ///
    /// Returns `Err` only for faults worth a queue retry; terminal business
    /// outcomes (failed wallet, failed issuance) are recorded in the order
    /// status and reported as success to the queue.
    #[tracing::instrument(skip_all, fields(job_id = %job.id, key = %job.key))]
    pub async fn process(&self, job: &Job) -> Result<()> {
        let started = std::time::Instant::now();
        let result = self.run(job).await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("pipeline_jobs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("pipeline_job_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, job: &Job) -> Result<()> {
        let payload: SagaJobPayload =
            serde_json::from_value(job.payload.clone()).map_err(StoreError::Serialization)?;

        let raw = self
            .store
            .get_raw_event(payload.raw_event_id)
            .await?
            .ok_or(SagaError::EventNotFound(payload.raw_event_id))?;
        let resolved = OrderEvent::from_value(&raw.payload)?.resolve()?;

        let customer = self.upsert_customer(&raw.shop, &resolved).await;
        let user = self.resolve_user(&resolved, customer.as_ref()).await?;
        let order = self
            .store
            .find_or_create_order(OrderRecord {
                id: RecordId::new(),
                user_id: user.id,
                external_order_id: resolved.external_order_id,
                status: OrderStatus::Processing,
                total_items: resolved.total_units() as i32,
                notification_sent_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await?
            .into_inner();

        self.notify(&user, &order, &resolved).await?;
        let order = self
            .store
            .update_order_status(order.id, OrderStatus::PendingWallet)
            .await?;

        let user = self.provision_wallet(&user, &order).await?;

        let line_items = self.mirror_order(&raw.shop, &resolved).await?;
        self.issue_identities(&raw.shop, &user, &order, &line_items, &resolved)
            .await?;

        self.store.mark_raw_event_processed(raw.id, None).await?;
        tracing::info!(order = %resolved.order_label(), "saga completed");
        Ok(())
    }

    /// Mirrors the platform's customer record. A failure here only loses
    /// denormalized context, so it is logged and tolerated.
    async fn upsert_customer(&self, shop: &str, resolved: &ResolvedOrder) -> Option<Customer> {
        let payload = resolved.event.customer.as_ref()?;
        let external_id = payload.id?;
        let now = Utc::now();
        let candidate = Customer {
            id: RecordId::new(),
            shop: shop.to_string(),
            external_id,
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            created_at: now,
            updated_at: now,
        };
        match self.store.upsert_customer(candidate).await {
            Ok(customer) => Some(customer),
            Err(e) => {
                tracing::warn!(error = %e, "customer upsert failed, continuing without");
                None
            }
        }
    }

    async fn resolve_user(
        &self,
        resolved: &ResolvedOrder,
        customer: Option<&Customer>,
    ) -> Result<PlatformUser> {
        let phone = resolved.event.contact_phone().ok_or_else(|| {
            SagaError::UserResolution(format!(
                "no contact phone for order {}",
                resolved.order_label()
            ))
        })?;
        let display_name = customer.and_then(|c| match (&c.first_name, &c.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        });
        let user = self
            .store
            .find_or_create_user(PlatformUser {
                id: RecordId::new(),
                phone,
                customer_id: customer.map(|c| c.id),
                display_name,
                wallet_address: None,
                wallet_did: None,
                created_at: Utc::now(),
            })
            .await?
            .into_inner();
        Ok(user)
    }

    /// Sends the order confirmation once per order.
    ///
    /// The stamp is written even when the provider errors, trading a lost
    /// message on this order for never spamming the buyer across retries.
    async fn notify(
        &self,
        user: &PlatformUser,
        order: &OrderRecord,
        resolved: &ResolvedOrder,
    ) -> Result<()> {
        if order.notification_sent_at.is_some() {
            tracing::debug!(order = %resolved.order_label(), "notification already sent");
            return Ok(());
        }

        if self.notification.is_configured() {
            let body = format!(
                "Your order {} is confirmed. Your digital collectibles are on the way.",
                resolved.order_label()
            );
            match self.notification.send(&user.phone, &body).await {
                Ok(receipt) => {
                    metrics::counter!("notifications_sent_total").increment(1);
                    tracing::info!(message_id = %receipt.id, "order confirmation sent");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "order confirmation failed");
                }
            }
        } else {
            tracing::info!("notification provider not configured, skipping send");
        }

        self.store
            .stamp_notification_sent(order.id, Utc::now())
            .await?;
        Ok(())
    }

    /// Ensures the user owns a wallet, recording failure in the order
    /// status without aborting the saga.
    async fn provision_wallet(
        &self,
        user: &PlatformUser,
        order: &OrderRecord,
    ) -> Result<PlatformUser> {
        if user.wallet_address.is_some() {
            self.store
                .update_order_status(order.id, OrderStatus::WalletProvisioned)
                .await?;
            return Ok(user.clone());
        }

        if user.phone.trim().is_empty() {
            self.store
                .update_order_status(order.id, OrderStatus::FailedNoPhoneForWallet)
                .await?;
            return Ok(user.clone());
        }

        match self.wallet.ensure_wallet(user.id, &user.phone).await {
            Ok(grant) => {
                self.store
                    .set_user_wallet(user.id, &grant.address, &grant.did)
                    .await?;
                self.store
                    .update_order_status(order.id, OrderStatus::WalletProvisioned)
                    .await?;
                metrics::counter!("wallets_provisioned_total").increment(1);
                let mut user = user.clone();
                user.wallet_address = Some(grant.address);
                user.wallet_did = Some(grant.did);
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "wallet provisioning failed");
                self.store
                    .update_order_status(order.id, OrderStatus::FailedWalletProvisioning)
                    .await?;
                Ok(user.clone())
            }
        }
    }

    /// Writes the denormalized order and line-item copies, returning the
    /// stored line items. Items without an external id cannot seed
    /// identities and are dropped from the mirror.
    async fn mirror_order(
        &self,
        shop: &str,
        resolved: &ResolvedOrder,
    ) -> Result<Vec<LineItemMirror>> {
        let event = &resolved.event;
        let now = Utc::now();
        let mirror = self
            .store
            .upsert_order_mirror(OrderMirror {
                id: RecordId::new(),
                shop: shop.to_string(),
                external_id: resolved.external_order_id,
                order_number: event.name.clone(),
                financial_status: event.financial_status.clone(),
                fulfillment_status: event.fulfillment_status.clone(),
                currency: event.currency.clone(),
                total_price: event.total_price.clone(),
                placed_at: event.created_at,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let items: Vec<LineItemMirror> = event
            .line_items
            .iter()
            .filter_map(|item| {
                let external_id = item.id?;
                Some(LineItemMirror {
                    id: RecordId::new(),
                    order_mirror_id: mirror.id,
                    external_id,
                    title: item.title.clone().unwrap_or_default(),
                    sku: item.sku.clone(),
                    quantity: item.units() as i32,
                    price: item.price.clone(),
                    product_external_id: item.product_id,
                    variant_external_id: item.variant_id,
                })
            })
            .collect();
        self.store.replace_line_items(mirror.id, items).await?;
        Ok(self.store.get_line_items(mirror.id).await?)
    }

    /// Runs issuance and folds the outcome into the order's final status.
    async fn issue_identities(
        &self,
        shop: &str,
        user: &PlatformUser,
        order: &OrderRecord,
        line_items: &[LineItemMirror],
        resolved: &ResolvedOrder,
    ) -> Result<()> {
        if line_items.is_empty() {
            tracing::warn!(order = %resolved.order_label(), "no line items to issue against");
            self.store
                .update_order_status(order.id, OrderStatus::FailedPrerequisitesForUdi)
                .await?;
            return Ok(());
        }

        let outcome = match self.issuer.issue_for_order(shop, user, order, line_items).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "identity issuance aborted");
                self.store
                    .update_order_status(order.id, OrderStatus::FailedUdiCreationError)
                    .await?;
                return Err(e);
            }
        };

        let status = match outcome {
            IssueOutcome { failed: 0, created, .. } if created > 0 => OrderStatus::Completed,
            IssueOutcome { created, failed, .. } if created > 0 && failed > 0 => {
                OrderStatus::PartiallyCompleted
            }
            _ => OrderStatus::FailedUdiCreation,
        };
        tracing::info!(
            order = %resolved.order_label(),
            created = outcome.created,
            failed = outcome.failed,
            status = %status,
            "identity issuance finished"
        );
        self.store.update_order_status(order.id, status).await?;
        Ok(())
    }
}
