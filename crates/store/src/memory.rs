use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::RecordId;
use domain::{
    Customer, DigitalIdentity, IdentityStatus, LineItemMirror, OrderMirror, OrderRecord,
    OrderStatus, PlatformUser, ProductVariant, RawEvent,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{Inserted, PipelineStore};

#[derive(Default)]
struct Inner {
    raw_events: HashMap<RecordId, RawEvent>,
    customers: HashMap<RecordId, Customer>,
    users: HashMap<RecordId, PlatformUser>,
    orders: HashMap<RecordId, OrderRecord>,
    mirrors: HashMap<RecordId, OrderMirror>,
    line_items: HashMap<RecordId, LineItemMirror>,
    variants: HashMap<RecordId, ProductVariant>,
    identities: HashMap<RecordId, DigitalIdentity>,
}

/// In-memory pipeline store.
///
/// Stores all rows in memory behind a single RwLock and provides the same
/// interface as the PostgreSQL implementation. Natural-key lookups scan;
/// the store is intended for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored raw events.
    pub async fn raw_event_count(&self) -> usize {
        self.inner.read().await.raw_events.len()
    }

    /// Returns the number of stored digital identities.
    pub async fn identity_count(&self) -> usize {
        self.inner.read().await.identities.len()
    }

    /// Returns all stored raw events, for audit inspection in tests.
    pub async fn raw_events(&self) -> Vec<RawEvent> {
        self.inner.read().await.raw_events.values().cloned().collect()
    }
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn insert_raw_event(&self, event: RawEvent) -> Result<Inserted<RawEvent>> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .raw_events
            .values()
            .find(|e| e.dedup_key == event.dedup_key)
        {
            return Ok(Inserted::Existing(existing.clone()));
        }
        inner.raw_events.insert(event.id, event.clone());
        Ok(Inserted::Created(event))
    }

    async fn get_raw_event(&self, id: RecordId) -> Result<Option<RawEvent>> {
        Ok(self.inner.read().await.raw_events.get(&id).cloned())
    }

    async fn mark_raw_event_processed(&self, id: RecordId, note: Option<&str>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .raw_events
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("raw event {id}")))?;
        event.processed = true;
        event.process_note = note.map(str::to_string);
        event.error_count = 0;
        event.last_error = None;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn record_raw_event_error(&self, id: RecordId, message: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let event = inner
            .raw_events
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("raw event {id}")))?;
        event.error_count += 1;
        event.last_error = Some(message.to_string());
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_customer(&self, customer: Customer) -> Result<Customer> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .customers
            .values_mut()
            .find(|c| c.shop == customer.shop && c.external_id == customer.external_id)
        {
            existing.email = customer.email;
            existing.phone = customer.phone;
            existing.first_name = customer.first_name;
            existing.last_name = customer.last_name;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        inner.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn find_or_create_user(&self, user: PlatformUser) -> Result<Inserted<PlatformUser>> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.users.values().find(|u| u.phone == user.phone) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(Inserted::Created(user))
    }

    async fn get_user(&self, id: RecordId) -> Result<Option<PlatformUser>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn set_user_wallet(&self, user_id: RecordId, address: &str, did: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("platform user {user_id}")))?;
        user.wallet_address = Some(address.to_string());
        user.wallet_did = Some(did.to_string());
        Ok(())
    }

    async fn find_or_create_order(&self, order: OrderRecord) -> Result<Inserted<OrderRecord>> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .orders
            .values()
            .find(|o| o.user_id == order.user_id && o.external_order_id == order.external_order_id)
        {
            return Ok(Inserted::Existing(existing.clone()));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(Inserted::Created(order))
    }

    async fn get_order(&self, id: RecordId) -> Result<Option<OrderRecord>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> Result<OrderRecord> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        if order.status.can_advance_to(status) {
            order.status = status;
            order.updated_at = Utc::now();
        } else {
            tracing::warn!(
                %order_id,
                current = %order.status,
                refused = %status,
                "refusing order status regression"
            );
        }
        Ok(order.clone())
    }

    async fn stamp_notification_sent(&self, order_id: RecordId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        if order.notification_sent_at.is_none() {
            order.notification_sent_at = Some(at);
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_order_mirror(&self, mirror: OrderMirror) -> Result<OrderMirror> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .mirrors
            .values_mut()
            .find(|m| m.shop == mirror.shop && m.external_id == mirror.external_id)
        {
            existing.order_number = mirror.order_number;
            existing.financial_status = mirror.financial_status;
            existing.fulfillment_status = mirror.fulfillment_status;
            existing.currency = mirror.currency;
            existing.total_price = mirror.total_price;
            existing.placed_at = mirror.placed_at;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }
        inner.mirrors.insert(mirror.id, mirror.clone());
        Ok(mirror)
    }

    async fn replace_line_items(
        &self,
        order_mirror_id: RecordId,
        items: Vec<LineItemMirror>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .line_items
            .retain(|_, item| item.order_mirror_id != order_mirror_id);
        for mut item in items {
            item.order_mirror_id = order_mirror_id;
            inner.line_items.insert(item.id, item);
        }
        Ok(())
    }

    async fn get_line_items(&self, order_mirror_id: RecordId) -> Result<Vec<LineItemMirror>> {
        let inner = self.inner.read().await;
        let mut items: Vec<LineItemMirror> = inner
            .line_items
            .values()
            .filter(|item| item.order_mirror_id == order_mirror_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.external_id);
        Ok(items)
    }

    async fn upsert_variant(&self, variant: ProductVariant) -> Result<ProductVariant> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .variants
            .values_mut()
            .find(|v| v.shop == variant.shop && v.external_id == variant.external_id)
        {
            existing.sku = variant.sku;
            existing.title = variant.title;
            existing.brand_id = variant.brand_id;
            existing.contract_address = variant.contract_address;
            return Ok(existing.clone());
        }
        inner.variants.insert(variant.id, variant.clone());
        Ok(variant)
    }

    async fn find_variant(&self, shop: &str, external_id: i64) -> Result<Option<ProductVariant>> {
        Ok(self
            .inner
            .read()
            .await
            .variants
            .values()
            .find(|v| v.shop == shop && v.external_id == external_id)
            .cloned())
    }

    async fn insert_identity(
        &self,
        identity: DigitalIdentity,
    ) -> Result<Inserted<DigitalIdentity>> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.identities.values().find(|i| {
            i.shop == identity.shop
                && i.line_item_external_id == identity.line_item_external_id
                && i.unit_key == identity.unit_key
        }) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        inner.identities.insert(identity.id, identity.clone());
        Ok(Inserted::Created(identity))
    }

    async fn get_identity(&self, id: RecordId) -> Result<Option<DigitalIdentity>> {
        Ok(self.inner.read().await.identities.get(&id).cloned())
    }

    async fn identities_for_order(&self, order_id: RecordId) -> Result<Vec<DigitalIdentity>> {
        let inner = self.inner.read().await;
        let mut identities: Vec<DigitalIdentity> = inner
            .identities
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        identities.sort_by(|a, b| a.unit_key.cmp(&b.unit_key));
        Ok(identities)
    }

    async fn set_identity_status(&self, id: RecordId, status: IdentityStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let identity = inner
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("digital identity {id}")))?;
        identity.status = status;
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn record_mint_success(
        &self,
        id: RecordId,
        token_id: &str,
        transaction_hash: &str,
        contract_address: &str,
        minted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let identity = inner
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("digital identity {id}")))?;
        identity.status = IdentityStatus::Minted;
        identity.token_id = Some(token_id.to_string());
        identity.transaction_hash = Some(transaction_hash.to_string());
        identity.contract_address = contract_address.to_string();
        identity.minted_at = Some(minted_at);
        identity.mint_error = None;
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn record_mint_failure(&self, id: RecordId, error: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let identity = inner
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("digital identity {id}")))?;
        identity.status = IdentityStatus::MintFailed;
        identity.mint_error = Some(error.to_string());
        identity.updated_at = Utc::now();
        Ok(())
    }
}
