//! Schema validators for the five commerce message types.
//!
//! Each validator parses a rumor's tags into a typed detail struct. A rumor
//! that fails validation is dropped whole; nothing is stored partially.

use std::str::FromStr;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    ADDRESS_TAG, AMOUNT_TAG, CARRIER_TAG, CommerceEventType, EMAIL_TAG, ETA_TAG, EXPIRATION_TAG,
    ITEM_TAG, LIGHTNING_MEDIUM, PAYMENT_TAG, PHONE_TAG, SHIPPING_TAG, STATUS_TAG, TRACKING_TAG,
    TagView,
};

/// Reference to a listed product plus the quantity ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    /// `kind:pubkey:identifier` coordinate of the product listing.
    pub coordinate: String,
    pub quantity: u32,
}

impl ItemRef {
    /// Identifier segment of the coordinate (the product id).
    pub fn product_id(&self) -> Option<&str> {
        self.coordinate.splitn(3, ':').nth(2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_id: String,
    pub merchant: String,
    pub amount: u64,
    pub items: Vec<ItemRef>,
    pub shipping: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub message: String,
}

/// One `payment` tag: `["payment", medium, target, proof?]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub medium: String,
    pub target: String,
    /// Payment proof (e.g. a Lightning preimage) on receipts.
    pub proof: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestDetails {
    pub order_id: String,
    pub recipient: String,
    pub amount: u64,
    pub payment_methods: Vec<PaymentMethod>,
    pub expiration: Option<u64>,
    pub message: String,
}

impl PaymentRequestDetails {
    /// The first BOLT11 invoice offered, if any.
    pub fn lightning_invoice(&self) -> Option<&str> {
        self.payment_methods
            .iter()
            .find(|m| m.medium == LIGHTNING_MEDIUM)
            .map(|m| m.target.as_str())
    }
}

/// Merchant-side order workflow status carried by status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "confirmed" => Ok(WorkflowStatus::Confirmed),
            "processing" => Ok(WorkflowStatus::Processing),
            "completed" => Ok(WorkflowStatus::Completed),
            "cancelled" => Ok(WorkflowStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingStatus {
    Processing,
    Shipped,
    Delivered,
    Exception,
}

impl FromStr for ShippingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ShippingStatus::Processing),
            "shipped" => Ok(ShippingStatus::Shipped),
            "delivered" => Ok(ShippingStatus::Delivered),
            "exception" => Ok(ShippingStatus::Exception),
            other => Err(format!("unknown shipping status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateDetails {
    pub order_id: String,
    pub status: WorkflowStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingUpdateDetails {
    pub order_id: String,
    pub status: ShippingStatus,
    pub tracking: Option<String>,
    pub carrier: Option<String>,
    pub eta: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceiptDetails {
    pub order_id: String,
    pub recipient: String,
    pub payments: Vec<PaymentMethod>,
    pub amount: Option<u64>,
    pub message: String,
}

/// A validated commerce message, tagged by type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommerceMessage {
    Order(OrderDetails),
    PaymentRequest(PaymentRequestDetails),
    StatusUpdate(StatusUpdateDetails),
    ShippingUpdate(ShippingUpdateDetails),
    PaymentReceipt(PaymentReceiptDetails),
}

impl CommerceMessage {
    pub fn event_type(&self) -> CommerceEventType {
        match self {
            CommerceMessage::Order(_) => CommerceEventType::Order,
            CommerceMessage::PaymentRequest(_) => CommerceEventType::PaymentRequest,
            CommerceMessage::StatusUpdate(_) => CommerceEventType::StatusUpdate,
            CommerceMessage::ShippingUpdate(_) => CommerceEventType::ShippingUpdate,
            CommerceMessage::PaymentReceipt(_) => CommerceEventType::PaymentReceipt,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            CommerceMessage::Order(d) => &d.order_id,
            CommerceMessage::PaymentRequest(d) => &d.order_id,
            CommerceMessage::StatusUpdate(d) => &d.order_id,
            CommerceMessage::ShippingUpdate(d) => &d.order_id,
            CommerceMessage::PaymentReceipt(d) => &d.order_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Dispatch to the validator for `event_type`.
pub(crate) fn validate(
    event_type: CommerceEventType,
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<CommerceMessage, String> {
    match event_type {
        CommerceEventType::Order => validate_order(order_id, tags, content).map(CommerceMessage::Order),
        CommerceEventType::PaymentRequest => {
            validate_payment_request(order_id, tags, content).map(CommerceMessage::PaymentRequest)
        }
        CommerceEventType::StatusUpdate => {
            validate_status_update(order_id, tags, content).map(CommerceMessage::StatusUpdate)
        }
        CommerceEventType::ShippingUpdate => {
            validate_shipping_update(order_id, tags, content).map(CommerceMessage::ShippingUpdate)
        }
        CommerceEventType::PaymentReceipt => {
            validate_payment_receipt(order_id, tags, content).map(CommerceMessage::PaymentReceipt)
        }
    }
}

pub(crate) fn validate_order(
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<OrderDetails, String> {
    let merchant = required_pubkey(tags)?;
    let amount = required_amount(tags)?;

    let items = tags
        .all(ITEM_TAG)
        .map(parse_item)
        .collect::<Result<Vec<_>, _>>()?;
    if items.is_empty() {
        return Err("order has no item tags".to_string());
    }

    let shipping = match tags.first(SHIPPING_TAG) {
        Some(coordinate) => {
            check_coordinate(coordinate)?;
            Some(coordinate.to_string())
        }
        None => None,
    };

    Ok(OrderDetails {
        order_id: order_id.to_string(),
        merchant,
        amount,
        items,
        shipping,
        address: optional_value(tags, ADDRESS_TAG),
        phone: optional_value(tags, PHONE_TAG),
        email: optional_value(tags, EMAIL_TAG),
        message: content.to_string(),
    })
}

pub(crate) fn validate_payment_request(
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<PaymentRequestDetails, String> {
    let recipient = required_pubkey(tags)?;
    let amount = required_amount(tags)?;
    let payment_methods = payment_methods(tags)?;
    if payment_methods.is_empty() {
        return Err("payment request has no payment tags".to_string());
    }
    let expiration = match tags.first(EXPIRATION_TAG) {
        Some(raw) => Some(
            raw.parse::<u64>()
                .map_err(|_| format!("invalid expiration: {raw}"))?,
        ),
        None => None,
    };

    Ok(PaymentRequestDetails {
        order_id: order_id.to_string(),
        recipient,
        amount,
        payment_methods,
        expiration,
        message: content.to_string(),
    })
}

pub(crate) fn validate_status_update(
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<StatusUpdateDetails, String> {
    let raw = tags
        .first(STATUS_TAG)
        .ok_or_else(|| "status update has no status tag".to_string())?;
    Ok(StatusUpdateDetails {
        order_id: order_id.to_string(),
        status: raw.parse()?,
        message: content.to_string(),
    })
}

pub(crate) fn validate_shipping_update(
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<ShippingUpdateDetails, String> {
    let raw = tags
        .first(STATUS_TAG)
        .ok_or_else(|| "shipping update has no status tag".to_string())?;
    let eta = match tags.first(ETA_TAG) {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| format!("invalid eta: {raw}"))?),
        None => None,
    };
    Ok(ShippingUpdateDetails {
        order_id: order_id.to_string(),
        status: raw.parse()?,
        tracking: optional_value(tags, TRACKING_TAG),
        carrier: optional_value(tags, CARRIER_TAG),
        eta,
        message: content.to_string(),
    })
}

pub(crate) fn validate_payment_receipt(
    order_id: &str,
    tags: &TagView<'_>,
    content: &str,
) -> Result<PaymentReceiptDetails, String> {
    let recipient = required_pubkey(tags)?;
    let payments = payment_methods(tags)?;
    if payments.is_empty() {
        return Err("receipt has no payment tags".to_string());
    }
    let amount = match tags.first(AMOUNT_TAG) {
        Some(_) => Some(required_amount(tags)?),
        None => None,
    };
    Ok(PaymentReceiptDetails {
        order_id: order_id.to_string(),
        recipient,
        payments,
        amount,
        message: content.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn required_pubkey(tags: &TagView<'_>) -> Result<String, String> {
    let raw = tags
        .first("p")
        .ok_or_else(|| "missing p tag".to_string())?;
    let pk = PublicKey::from_hex(raw).map_err(|e| format!("invalid p tag: {e}"))?;
    Ok(pk.to_hex())
}

fn required_amount(tags: &TagView<'_>) -> Result<u64, String> {
    let raw = tags
        .first(AMOUNT_TAG)
        .ok_or_else(|| "missing amount tag".to_string())?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid amount: {raw}"))
}

fn optional_value(tags: &TagView<'_>, name: &str) -> Option<String> {
    tags.first(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn payment_methods(tags: &TagView<'_>) -> Result<Vec<PaymentMethod>, String> {
    tags.all(PAYMENT_TAG)
        .map(|row| match row {
            [_, medium, target, rest @ ..] if !medium.is_empty() && !target.is_empty() => {
                Ok(PaymentMethod {
                    medium: medium.clone(),
                    target: target.clone(),
                    proof: rest.first().cloned(),
                })
            }
            _ => Err(format!("malformed payment tag: {row:?}")),
        })
        .collect()
}

fn parse_item(row: &[String]) -> Result<ItemRef, String> {
    let [_, coordinate, quantity, ..] = row else {
        return Err(format!("malformed item tag: {row:?}"));
    };
    check_coordinate(coordinate)?;
    let quantity = quantity
        .parse::<u32>()
        .map_err(|_| format!("invalid item quantity: {quantity}"))?;
    if quantity == 0 {
        return Err(format!("item {coordinate} has zero quantity"));
    }
    Ok(ItemRef {
        coordinate: coordinate.clone(),
        quantity,
    })
}

/// Check a `kind:pubkey:identifier` coordinate.
pub(crate) fn check_coordinate(coordinate: &str) -> Result<(), String> {
    let mut parts = coordinate.splitn(3, ':');
    let (Some(kind), Some(pubkey), Some(identifier)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("malformed coordinate: {coordinate}"));
    };
    kind.parse::<u16>()
        .map_err(|_| format!("invalid coordinate kind: {kind}"))?;
    PublicKey::from_hex(pubkey).map_err(|e| format!("invalid coordinate pubkey: {e}"))?;
    if identifier.is_empty() {
        return Err(format!("coordinate {coordinate} has no identifier"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{ORDER_TAG, value_tag, values_tag};

    fn pk() -> String {
        Keys::generate().public_key().to_hex()
    }

    #[test]
    fn order_requires_items() {
        let merchant = pk();
        let tags = vec![
            value_tag("p", merchant.clone()),
            value_tag(ORDER_TAG, "o-1"),
            value_tag(AMOUNT_TAG, "1000"),
        ];
        let view = TagView::new(tags.iter());
        let err = validate_order("o-1", &view, "").unwrap_err();
        assert!(err.contains("no item"));
    }

    #[test]
    fn order_parses_items_and_contact() {
        let merchant = pk();
        let tags = vec![
            value_tag("p", merchant.clone()),
            value_tag(AMOUNT_TAG, "2500"),
            values_tag(ITEM_TAG, vec![format!("30402:{merchant}:mug"), "2".into()]),
            value_tag(SHIPPING_TAG, format!("30406:{merchant}:standard")),
            value_tag(EMAIL_TAG, "buyer@example.com"),
        ];
        let view = TagView::new(tags.iter());
        let details = validate_order("o-1", &view, "gift wrap please").unwrap();
        assert_eq!(details.amount, 2500);
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].quantity, 2);
        assert_eq!(details.items[0].product_id(), Some("mug"));
        assert_eq!(details.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(details.phone, None);
        assert_eq!(details.message, "gift wrap please");
    }

    #[test]
    fn zero_quantity_item_is_rejected() {
        let merchant = pk();
        let row = vec![
            ITEM_TAG.to_string(),
            format!("30402:{merchant}:mug"),
            "0".to_string(),
        ];
        assert!(parse_item(&row).unwrap_err().contains("zero quantity"));
    }

    #[test]
    fn coordinate_checks() {
        let merchant = pk();
        assert!(check_coordinate(&format!("30402:{merchant}:mug")).is_ok());
        assert!(check_coordinate(&format!("30402:{merchant}:a:b")).is_ok());
        assert!(check_coordinate("30402:nothex:mug").is_err());
        assert!(check_coordinate(&format!("kind:{merchant}:mug")).is_err());
        assert!(check_coordinate(&format!("30402:{merchant}:")).is_err());
        assert!(check_coordinate("30402").is_err());
    }

    #[test]
    fn payment_request_finds_lightning_invoice() {
        let buyer = pk();
        let tags = vec![
            value_tag("p", buyer),
            value_tag(AMOUNT_TAG, "21000"),
            values_tag(PAYMENT_TAG, vec!["bitcoin".into(), "bc1qexample".into()]),
            values_tag(PAYMENT_TAG, vec!["lightning".into(), "lnbc1example".into()]),
            value_tag(EXPIRATION_TAG, "1700003600"),
        ];
        let view = TagView::new(tags.iter());
        let details = validate_payment_request("o-1", &view, "").unwrap();
        assert_eq!(details.lightning_invoice(), Some("lnbc1example"));
        assert_eq!(details.expiration, Some(1_700_003_600));
        assert_eq!(details.payment_methods.len(), 2);
    }

    #[test]
    fn payment_request_rejects_bad_expiration() {
        let tags = vec![
            value_tag("p", pk()),
            value_tag(AMOUNT_TAG, "1"),
            values_tag(PAYMENT_TAG, vec!["lightning".into(), "lnbc1".into()]),
            value_tag(EXPIRATION_TAG, "soon"),
        ];
        let view = TagView::new(tags.iter());
        assert!(validate_payment_request("o-1", &view, "").is_err());
    }

    #[test]
    fn status_values_are_closed_sets() {
        assert_eq!("shipped".parse::<ShippingStatus>(), Ok(ShippingStatus::Shipped));
        assert!("shipped".parse::<WorkflowStatus>().is_err());
        assert_eq!(
            "cancelled".parse::<WorkflowStatus>(),
            Ok(WorkflowStatus::Cancelled)
        );
    }

    #[test]
    fn receipt_keeps_preimage() {
        let tags = vec![
            value_tag("p", pk()),
            values_tag(
                PAYMENT_TAG,
                vec!["lightning".into(), "lnbc1".into(), "00ff".into()],
            ),
        ];
        let view = TagView::new(tags.iter());
        let details = validate_payment_receipt("o-1", &view, "").unwrap();
        assert_eq!(details.payments[0].proof.as_deref(), Some("00ff"));
        assert_eq!(details.amount, None);
    }
}
