//! Persisted entities of the fulfillment pipeline.
//!
//! All entities are relational rows keyed by a [`RecordId`] primary key,
//! with natural business keys enforcing idempotency at the store layer.

use chrono::{DateTime, Utc};
use common::RecordId;
use serde::{Deserialize, Serialize};

use crate::status::{IdentityStatus, OrderStatus};

/// Immutable capture of an inbound commerce event.
///
/// Created once per distinct dedup key; mutated only to flip the processed
/// flag and error fields; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: RecordId,
    /// Unique key collapsing duplicate deliveries of the same logical event.
    pub dedup_key: String,
    pub shop: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    /// Explanatory note set when processing short-circuits deliberately.
    pub process_note: Option<String>,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(
        dedup_key: impl Into<String>,
        shop: impl Into<String>,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            dedup_key: dedup_key.into(),
            shop: shop.into(),
            topic: topic.into(),
            payload,
            processed: false,
            process_note: None,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mirror of the commerce platform's customer, keyed `(shop, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: RecordId,
    pub shop: String,
    pub external_id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The system's own buyer identity, keyed by phone number.
///
/// Aggregation root for wallet and digital-identity ownership. Wallet
/// fields are set once by the provisioning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: RecordId,
    pub phone: String,
    pub customer_id: Option<RecordId>,
    pub display_name: Option<String>,
    pub wallet_address: Option<String>,
    pub wallet_did: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The pipeline's order aggregate, keyed `(user_id, external_order_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: RecordId,
    pub user_id: RecordId,
    pub external_order_id: i64,
    pub status: OrderStatus,
    pub total_items: i32,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized copy of the external order, keyed `(shop, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMirror {
    pub id: RecordId,
    pub shop: String,
    pub external_id: i64,
    pub order_number: Option<String>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub currency: Option<String>,
    pub total_price: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized copy of one external line item.
///
/// Rows are replaced wholesale per order on each processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemMirror {
    pub id: RecordId,
    pub order_mirror_id: RecordId,
    pub external_id: i64,
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub price: Option<String>,
    pub product_external_id: Option<i64>,
    pub variant_external_id: Option<i64>,
}

/// Canonical catalog record for a purchasable variant, keyed
/// `(shop, external_id)`.
///
/// A variant without a brand linkage is not issuable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: RecordId,
    pub shop: String,
    pub external_id: i64,
    pub sku: Option<String>,
    pub title: String,
    pub brand_id: Option<RecordId>,
    /// Contract to mint against; falls back to the process-wide default.
    pub contract_address: Option<String>,
}

/// One digital identity per purchased physical unit, keyed
/// `(shop, line_item_external_id, unit_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitalIdentity {
    pub id: RecordId,
    pub variant_id: RecordId,
    pub user_id: RecordId,
    pub order_id: RecordId,
    pub shop: String,
    pub line_item_external_id: i64,
    /// Disambiguates units of a multi-quantity line item.
    pub unit_key: String,
    pub status: IdentityStatus,
    pub contract_address: String,
    pub token_id: Option<String>,
    pub transaction_hash: Option<String>,
    pub minted_at: Option<DateTime<Utc>>,
    pub owner_address: Option<String>,
    pub owner_did: Option<String>,
    /// Error message recorded on transition to `MintFailed`.
    pub mint_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DigitalIdentity {
    /// Computes the per-unit uniqueness key for a line item.
    ///
    /// The unit index is appended only when the line item's quantity is
    /// greater than one, matching the issuance uniqueness invariant.
    pub fn unit_key(line_item_external_id: i64, unit_index: u32, quantity: u32) -> String {
        if quantity > 1 {
            format!("{line_item_external_id}#{unit_index}")
        } else {
            line_item_external_id.to_string()
        }
    }
}
