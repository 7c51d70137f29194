//! Commerce messages exchanged between buyer and merchant.
//!
//! Orders, payment requests, status updates, shipping updates and receipts
//! travel as NIP-17 private messages: a kind 16/17 rumor sealed by the real
//! sender and gift-wrapped by a throwaway key. This module owns the wire
//! vocabulary, the envelope codec and the classification pipeline.

pub(crate) mod classify;
pub(crate) mod envelope;
pub(crate) mod order;
pub(crate) mod validation;

use std::fmt;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// Rumor kind for order processing messages (carries a `type` tag).
pub const ORDER_MESSAGE_KIND: u16 = 16;

/// Rumor kind for payment receipts (no `type` tag).
pub const PAYMENT_RECEIPT_KIND: u16 = 17;

/// Addressable kind of a product listing, referenced by `item` tags.
pub const PRODUCT_LISTING_KIND: u16 = 30402;

/// Addressable kind of a shipping option, referenced by `shipping` tags.
pub const SHIPPING_OPTION_KIND: u16 = 30406;

pub const ORDER_TAG: &str = "order";
pub const TYPE_TAG: &str = "type";
pub const SUBJECT_TAG: &str = "subject";
pub const AMOUNT_TAG: &str = "amount";
pub const EXPIRATION_TAG: &str = "expiration";
pub const ITEM_TAG: &str = "item";
pub const SHIPPING_TAG: &str = "shipping";
pub const PAYMENT_TAG: &str = "payment";
pub const STATUS_TAG: &str = "status";
pub const TRACKING_TAG: &str = "tracking";
pub const CARRIER_TAG: &str = "carrier";
pub const ETA_TAG: &str = "eta";
pub const ADDRESS_TAG: &str = "address";
pub const PHONE_TAG: &str = "phone";
pub const EMAIL_TAG: &str = "email";

pub const ORDER_SUBJECT: &str = "order-info";
pub const RECEIPT_SUBJECT: &str = "order-receipt";

/// Payment medium carrying a BOLT11 invoice in a `payment` tag.
pub const LIGHTNING_MEDIUM: &str = "lightning";

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use classify::{ClassifiedEvent, classify_rumor, process_gift_wrap};
pub use envelope::{
    OrderEnvelope, build_gift_wrap_filter, gift_wrap_seal, open_seal, seal_rumor,
    unwrap_gift_wrap,
};
pub use order::{
    ContactInfo, OrderItem, OrderRequest, ReceiptRequest, ShippingSelection, build_order_rumor,
    build_receipt_rumor, encode_order, encode_receipt,
};
pub use validation::{
    CommerceMessage, ItemRef, OrderDetails, PaymentMethod, PaymentReceiptDetails,
    PaymentRequestDetails, ShippingStatus, ShippingUpdateDetails, StatusUpdateDetails,
    WorkflowStatus,
};

// ---------------------------------------------------------------------------
// Event taxonomy
// ---------------------------------------------------------------------------

/// The five commerce message types. Each has its own store partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommerceEventType {
    Order,
    PaymentRequest,
    StatusUpdate,
    ShippingUpdate,
    PaymentReceipt,
}

impl CommerceEventType {
    pub const ALL: [CommerceEventType; 5] = [
        CommerceEventType::Order,
        CommerceEventType::PaymentRequest,
        CommerceEventType::StatusUpdate,
        CommerceEventType::ShippingUpdate,
        CommerceEventType::PaymentReceipt,
    ];

    /// Value of the `type` tag on kind 16 rumors. Receipts have none.
    pub fn type_tag(self) -> Option<&'static str> {
        match self {
            CommerceEventType::Order => Some("1"),
            CommerceEventType::PaymentRequest => Some("2"),
            CommerceEventType::StatusUpdate => Some("3"),
            CommerceEventType::ShippingUpdate => Some("4"),
            CommerceEventType::PaymentReceipt => None,
        }
    }

    pub fn from_type_tag(value: &str) -> Option<Self> {
        match value {
            "1" => Some(CommerceEventType::Order),
            "2" => Some(CommerceEventType::PaymentRequest),
            "3" => Some(CommerceEventType::StatusUpdate),
            "4" => Some(CommerceEventType::ShippingUpdate),
            _ => None,
        }
    }

    /// Rumor kind this type travels as.
    pub fn kind(self) -> u16 {
        match self {
            CommerceEventType::PaymentReceipt => PAYMENT_RECEIPT_KIND,
            _ => ORDER_MESSAGE_KIND,
        }
    }
}

impl fmt::Display for CommerceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommerceEventType::Order => "order",
            CommerceEventType::PaymentRequest => "payment request",
            CommerceEventType::StatusUpdate => "status update",
            CommerceEventType::ShippingUpdate => "shipping update",
            CommerceEventType::PaymentReceipt => "payment receipt",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Tag access
// ---------------------------------------------------------------------------

/// Read-only view over an event's tags, keyed by tag name.
#[derive(Debug, Clone)]
pub struct TagView<'a> {
    rows: Vec<&'a [String]>,
}

impl<'a> TagView<'a> {
    pub fn new<I>(tags: I) -> Self
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        Self {
            rows: tags.into_iter().map(|t| t.as_slice()).collect(),
        }
    }

    /// First value (index 1) of the first tag named `name`.
    pub fn first(&self, name: &str) -> Option<&'a str> {
        self.all(name)
            .find_map(|row| row.get(1))
            .map(|s| s.as_str())
    }

    /// Every tag named `name`, including the name at index 0.
    pub fn all<'b>(&'b self, name: &'b str) -> impl Iterator<Item = &'a [String]> + 'b {
        self.rows
            .iter()
            .copied()
            .filter(move |row| row.first().is_some_and(|n| n == name))
    }

    /// The non-empty `order` correlation id, if present.
    pub fn order_id(&self) -> Option<&'a str> {
        self.first(ORDER_TAG).filter(|id| !id.trim().is_empty())
    }
}

/// Build a single-value custom tag (`[name, value]`).
pub(crate) fn value_tag(name: &str, value: impl Into<String>) -> Tag {
    Tag::custom(TagKind::custom(name), vec![value.into()])
}

/// Build a multi-value custom tag (`[name, values...]`).
pub(crate) fn values_tag(name: &str, values: Vec<String>) -> Tag {
    Tag::custom(TagKind::custom(name), values)
}
