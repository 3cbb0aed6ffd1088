//! Typed inbound commerce-event payload.
//!
//! The platform delivers a loosely structured JSON document; every field is
//! optional at the wire level. Validation happens in one explicit step that
//! produces a [`ResolvedOrder`] before any business logic runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Customer sub-document of an order event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Address sub-document of an order event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressPayload {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// One line item of an order event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItemPayload {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<String>,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
}

impl LineItemPayload {
    /// Returns the purchased quantity, defaulting to one unit.
    pub fn units(&self) -> u32 {
        self.quantity.unwrap_or(1).max(1)
    }
}

/// An inbound order event as delivered by the commerce platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Option<i64>,
    /// Human-facing order label, e.g. `"#1001"`.
    pub name: Option<String>,
    pub phone: Option<String>,
    pub customer: Option<CustomerPayload>,
    pub shipping_address: Option<AddressPayload>,
    pub billing_address: Option<AddressPayload>,
    #[serde(default)]
    pub line_items: Vec<LineItemPayload>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub currency: Option<String>,
    pub total_price: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl OrderEvent {
    /// Deserializes an event from a raw JSON document.
    ///
    /// The document must be a non-empty JSON object; unknown fields are
    /// ignored.
    pub fn from_value(payload: &serde_json::Value) -> Result<Self, DomainError> {
        let object = payload
            .as_object()
            .ok_or_else(|| DomainError::MalformedPayload("payload is not an object".into()))?;
        if object.is_empty() {
            return Err(DomainError::MalformedPayload("payload is empty".into()));
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::MalformedPayload(e.to_string()))
    }

    /// Validates that the event carries a numeric external order id.
    pub fn resolve(self) -> Result<ResolvedOrder, DomainError> {
        let external_order_id = self.id.ok_or(DomainError::MissingOrderId)?;
        Ok(ResolvedOrder {
            external_order_id,
            event: self,
        })
    }

    /// Best-effort contact phone number from a prioritized set of locations.
    ///
    /// Checked in order: the order's direct phone field, the shipping
    /// address, the billing address, then the customer record. The first
    /// non-empty value wins.
    pub fn contact_phone(&self) -> Option<String> {
        non_empty(self.phone.as_ref())
            .or_else(|| non_empty(self.shipping_address.as_ref().and_then(|a| a.phone.as_ref())))
            .or_else(|| non_empty(self.billing_address.as_ref().and_then(|a| a.phone.as_ref())))
            .or_else(|| non_empty(self.customer.as_ref().and_then(|c| c.phone.as_ref())))
    }
}

/// An order event that passed validation: the external order id is present.
#[derive(Debug, Clone)]
pub struct ResolvedOrder {
    pub external_order_id: i64,
    pub event: OrderEvent,
}

impl ResolvedOrder {
    /// Human-facing order label, falling back to the external id.
    pub fn order_label(&self) -> String {
        self.event
            .name
            .clone()
            .unwrap_or_else(|| format!("#{}", self.external_order_id))
    }

    /// Total purchased units across all line items.
    pub fn total_units(&self) -> u32 {
        self.event.line_items.iter().map(LineItemPayload::units).sum()
    }
}
