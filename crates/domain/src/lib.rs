//! Data model for the order-to-digital-identity fulfillment pipeline.
//!
//! Defines the persisted entities (raw events, customers, platform users,
//! order records and mirrors, product variants, digital identities), the
//! two status state machines the pipeline drives, and the typed inbound
//! commerce-event payload with its validation and phone-extraction rules.

pub mod error;
pub mod event;
pub mod records;
pub mod status;

pub use error::DomainError;
pub use event::{
    AddressPayload, CustomerPayload, LineItemPayload, OrderEvent, ResolvedOrder,
};
pub use records::{
    Customer, DigitalIdentity, LineItemMirror, OrderMirror, OrderRecord, PlatformUser,
    ProductVariant, RawEvent,
};
pub use status::{IdentityStatus, OrderStatus};
