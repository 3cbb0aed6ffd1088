use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::RecordId;
use domain::{
    Customer, DigitalIdentity, IdentityStatus, LineItemMirror, OrderMirror, OrderRecord,
    OrderStatus, PlatformUser, ProductVariant, RawEvent,
};

use crate::Result;

/// Outcome of an idempotent create: either a fresh row or the row that was
/// already there under the same natural key.
#[derive(Debug, Clone)]
pub enum Inserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Inserted<T> {
    /// Returns true if the row was created by this call.
    pub fn was_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }

    /// Unwraps to the inner record either way.
    pub fn into_inner(self) -> T {
        match self {
            Inserted::Created(t) | Inserted::Existing(t) => t,
        }
    }

    /// Borrows the inner record either way.
    pub fn record(&self) -> &T {
        match self {
            Inserted::Created(t) | Inserted::Existing(t) => t,
        }
    }
}

/// Core trait for pipeline store implementations.
///
/// Every write keyed by a natural business identifier uses atomic upsert
/// semantics, not read-then-write, so reclaimed stalled jobs may execute
/// concurrently without duplicating rows. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait PipelineStore: Send + Sync {
    // -- Raw events --

    /// Inserts a raw event unless one already exists for its dedup key.
    async fn insert_raw_event(&self, event: RawEvent) -> Result<Inserted<RawEvent>>;

    /// Fetches a raw event by id.
    async fn get_raw_event(&self, id: RecordId) -> Result<Option<RawEvent>>;

    /// Marks a raw event processed, clearing its error count.
    ///
    /// An optional note records deliberate short-circuits.
    async fn mark_raw_event_processed(&self, id: RecordId, note: Option<&str>) -> Result<()>;

    /// Bumps a raw event's error count and records the last error message.
    async fn record_raw_event_error(&self, id: RecordId, message: &str) -> Result<()>;

    // -- Customers & platform users --

    /// Upserts a customer keyed `(shop, external_id)`.
    ///
    /// Known fields are overwritten deterministically; the existing primary
    /// key is preserved.
    async fn upsert_customer(&self, customer: Customer) -> Result<Customer>;

    /// Finds a platform user by phone number, creating one if absent.
    async fn find_or_create_user(&self, user: PlatformUser) -> Result<Inserted<PlatformUser>>;

    /// Fetches a platform user by id.
    async fn get_user(&self, id: RecordId) -> Result<Option<PlatformUser>>;

    /// Stores the provisioned wallet address and DID on a user.
    async fn set_user_wallet(&self, user_id: RecordId, address: &str, did: &str) -> Result<()>;

    // -- Order records --

    /// Finds an order record keyed `(user_id, external_order_id)`, creating
    /// one at the given initial state if absent.
    async fn find_or_create_order(&self, order: OrderRecord) -> Result<Inserted<OrderRecord>>;

    /// Fetches an order record by id.
    async fn get_order(&self, id: RecordId) -> Result<Option<OrderRecord>>;

    /// Advances an order's status.
    ///
    /// A transition to an earlier pipeline stage is refused and leaves the
    /// row unchanged; the current row is returned either way.
    async fn update_order_status(
        &self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> Result<OrderRecord>;

    /// Stamps the notification-sent timestamp, keeping the earliest value.
    async fn stamp_notification_sent(
        &self,
        order_id: RecordId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // -- Order mirrors --

    /// Upserts the denormalized order copy keyed `(shop, external_id)`.
    async fn upsert_order_mirror(&self, mirror: OrderMirror) -> Result<OrderMirror>;

    /// Replaces all line-item rows for a mirrored order (delete-then-insert).
    async fn replace_line_items(
        &self,
        order_mirror_id: RecordId,
        items: Vec<LineItemMirror>,
    ) -> Result<()>;

    /// Fetches the line items of a mirrored order.
    async fn get_line_items(&self, order_mirror_id: RecordId) -> Result<Vec<LineItemMirror>>;

    // -- Product variants --

    /// Upserts a catalog variant keyed `(shop, external_id)`.
    async fn upsert_variant(&self, variant: ProductVariant) -> Result<ProductVariant>;

    /// Resolves a catalog variant by `(shop, external_id)`.
    async fn find_variant(&self, shop: &str, external_id: i64) -> Result<Option<ProductVariant>>;

    // -- Digital identities --

    /// Inserts a digital identity unless one already exists for its
    /// `(shop, line_item_external_id, unit_key)` key.
    async fn insert_identity(
        &self,
        identity: DigitalIdentity,
    ) -> Result<Inserted<DigitalIdentity>>;

    /// Fetches a digital identity by id.
    async fn get_identity(&self, id: RecordId) -> Result<Option<DigitalIdentity>>;

    /// Lists all digital identities issued for an order record.
    async fn identities_for_order(&self, order_id: RecordId) -> Result<Vec<DigitalIdentity>>;

    /// Sets a digital identity's minting status.
    async fn set_identity_status(&self, id: RecordId, status: IdentityStatus) -> Result<()>;

    /// Records a successful mint: chain identifiers plus the `Minted` status.
    async fn record_mint_success(
        &self,
        id: RecordId,
        token_id: &str,
        transaction_hash: &str,
        contract_address: &str,
        minted_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Records a failed mint: the error message plus the `MintFailed` status.
    async fn record_mint_failure(&self, id: RecordId, error: &str) -> Result<()>;
}

// Delegation so the binary can pick an implementation at runtime and hand
// the pipeline an `Arc<dyn PipelineStore>`.
#[async_trait]
impl<T: PipelineStore + ?Sized> PipelineStore for Arc<T> {
    async fn insert_raw_event(&self, event: RawEvent) -> Result<Inserted<RawEvent>> {
        (**self).insert_raw_event(event).await
    }

    async fn get_raw_event(&self, id: RecordId) -> Result<Option<RawEvent>> {
        (**self).get_raw_event(id).await
    }

    async fn mark_raw_event_processed(&self, id: RecordId, note: Option<&str>) -> Result<()> {
        (**self).mark_raw_event_processed(id, note).await
    }

    async fn record_raw_event_error(&self, id: RecordId, message: &str) -> Result<()> {
        (**self).record_raw_event_error(id, message).await
    }

    async fn upsert_customer(&self, customer: Customer) -> Result<Customer> {
        (**self).upsert_customer(customer).await
    }

    async fn find_or_create_user(&self, user: PlatformUser) -> Result<Inserted<PlatformUser>> {
        (**self).find_or_create_user(user).await
    }

    async fn get_user(&self, id: RecordId) -> Result<Option<PlatformUser>> {
        (**self).get_user(id).await
    }

    async fn set_user_wallet(&self, user_id: RecordId, address: &str, did: &str) -> Result<()> {
        (**self).set_user_wallet(user_id, address, did).await
    }

    async fn find_or_create_order(&self, order: OrderRecord) -> Result<Inserted<OrderRecord>> {
        (**self).find_or_create_order(order).await
    }

    async fn get_order(&self, id: RecordId) -> Result<Option<OrderRecord>> {
        (**self).get_order(id).await
    }

    async fn update_order_status(
        &self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> Result<OrderRecord> {
        (**self).update_order_status(order_id, status).await
    }

    async fn stamp_notification_sent(&self, order_id: RecordId, at: DateTime<Utc>) -> Result<()> {
        (**self).stamp_notification_sent(order_id, at).await
    }

    async fn upsert_order_mirror(&self, mirror: OrderMirror) -> Result<OrderMirror> {
        (**self).upsert_order_mirror(mirror).await
    }

    async fn replace_line_items(
        &self,
        order_mirror_id: RecordId,
        items: Vec<LineItemMirror>,
    ) -> Result<()> {
        (**self).replace_line_items(order_mirror_id, items).await
    }

    async fn get_line_items(&self, order_mirror_id: RecordId) -> Result<Vec<LineItemMirror>> {
        (**self).get_line_items(order_mirror_id).await
    }

    async fn upsert_variant(&self, variant: ProductVariant) -> Result<ProductVariant> {
        (**self).upsert_variant(variant).await
    }

    async fn find_variant(&self, shop: &str, external_id: i64) -> Result<Option<ProductVariant>> {
        (**self).find_variant(shop, external_id).await
    }

    async fn insert_identity(
        &self,
        identity: DigitalIdentity,
    ) -> Result<Inserted<DigitalIdentity>> {
        (**self).insert_identity(identity).await
    }

    async fn get_identity(&self, id: RecordId) -> Result<Option<DigitalIdentity>> {
        (**self).get_identity(id).await
    }

    async fn identities_for_order(&self, order_id: RecordId) -> Result<Vec<DigitalIdentity>> {
        (**self).identities_for_order(order_id).await
    }

    async fn set_identity_status(&self, id: RecordId, status: IdentityStatus) -> Result<()> {
        (**self).set_identity_status(id, status).await
    }

    async fn record_mint_success(
        &self,
        id: RecordId,
        token_id: &str,
        transaction_hash: &str,
        contract_address: &str,
        minted_at: DateTime<Utc>,
    ) -> Result<()> {
        (**self)
            .record_mint_success(id, token_id, transaction_hash, contract_address, minted_at)
            .await
    }

    async fn record_mint_failure(&self, id: RecordId, error: &str) -> Result<()> {
        (**self).record_mint_failure(id, error).await
    }
}
