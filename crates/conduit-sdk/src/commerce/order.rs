//! Outbound commerce messages built by the buyer: orders and receipts.

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::{OrderEnvelope, seal_and_wrap};
use super::validation::PaymentMethod;
use super::{
    ADDRESS_TAG, AMOUNT_TAG, CommerceEventType, EMAIL_TAG, ITEM_TAG, ORDER_SUBJECT, ORDER_TAG,
    PAYMENT_RECEIPT_KIND, PAYMENT_TAG, PHONE_TAG, PRODUCT_LISTING_KIND, RECEIPT_SUBJECT,
    SHIPPING_OPTION_KIND, SHIPPING_TAG, SUBJECT_TAG, TYPE_TAG, value_tag, values_tag,
};
use crate::error::{Error, Result};

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// `d` identifier of the merchant's product listing.
    pub product_id: String,
    pub quantity: u32,
    /// Unit price in sats.
    pub price: u64,
}

/// Shipping option chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSelection {
    /// `d` identifier of the merchant's shipping option event.
    pub method_id: String,
    /// Shipping cost in sats.
    pub cost: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub merchant: PublicKey,
    pub items: Vec<OrderItem>,
    pub shipping: Option<ShippingSelection>,
    pub contact: ContactInfo,
    /// Free-text note to the merchant.
    pub message: String,
}

impl OrderRequest {
    /// Order total in sats (items plus shipping), saturating on overflow.
    pub fn total(&self) -> u64 {
        let items = self.items.iter().fold(0u64, |acc, item| {
            acc.saturating_add(item.price.saturating_mul(u64::from(item.quantity)))
        });
        items.saturating_add(self.shipping.as_ref().map_or(0, |s| s.cost))
    }

    fn check(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::EmptyOrder);
        }
        for item in &self.items {
            if item.product_id.trim().is_empty() {
                return Err(Error::InvalidItem("empty product id".to_string()));
            }
            if item.quantity == 0 {
                return Err(Error::InvalidItem(format!(
                    "{} has zero quantity",
                    item.product_id
                )));
            }
        }
        Ok(())
    }
}

/// Receipt the buyer sends after paying a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptRequest {
    pub merchant: PublicKey,
    pub order_id: String,
    pub payment: PaymentMethod,
    pub amount: Option<u64>,
    pub message: String,
}

fn coordinate(kind: u16, merchant: &PublicKey, identifier: &str) -> String {
    format!("{kind}:{}:{identifier}", merchant.to_hex())
}

/// Build the unsigned kind 16 / type 1 order message.
pub fn build_order_rumor(
    buyer: PublicKey,
    order_id: &str,
    request: &OrderRequest,
    created_at: Timestamp,
) -> UnsignedEvent {
    let mut tags = vec![
        Tag::public_key(request.merchant),
        value_tag(SUBJECT_TAG, ORDER_SUBJECT),
        value_tag(
            TYPE_TAG,
            CommerceEventType::Order.type_tag().unwrap_or_default(),
        ),
        value_tag(ORDER_TAG, order_id),
        value_tag(AMOUNT_TAG, request.total().to_string()),
    ];

    for item in &request.items {
        tags.push(values_tag(
            ITEM_TAG,
            vec![
                coordinate(PRODUCT_LISTING_KIND, &request.merchant, &item.product_id),
                item.quantity.to_string(),
            ],
        ));
    }

    if let Some(shipping) = &request.shipping {
        tags.push(value_tag(
            SHIPPING_TAG,
            coordinate(SHIPPING_OPTION_KIND, &request.merchant, &shipping.method_id),
        ));
    }

    let contact = [
        (ADDRESS_TAG, &request.contact.address),
        (PHONE_TAG, &request.contact.phone),
        (EMAIL_TAG, &request.contact.email),
    ];
    for (name, value) in contact {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            tags.push(value_tag(name, value));
        }
    }

    let mut rumor = EventBuilder::new(Kind::from(CommerceEventType::Order.kind()), &request.message)
        .tags(tags)
        .custom_created_at(created_at)
        .build(buyer);
    rumor.ensure_id();
    rumor
}

/// Build the unsigned kind 17 payment receipt.
pub fn build_receipt_rumor(
    buyer: PublicKey,
    request: &ReceiptRequest,
    created_at: Timestamp,
) -> UnsignedEvent {
    let mut payment = vec![
        request.payment.medium.clone(),
        request.payment.target.clone(),
    ];
    if let Some(proof) = &request.payment.proof {
        payment.push(proof.clone());
    }

    let mut tags = vec![
        Tag::public_key(request.merchant),
        value_tag(SUBJECT_TAG, RECEIPT_SUBJECT),
        value_tag(ORDER_TAG, &request.order_id),
        values_tag(PAYMENT_TAG, payment),
    ];
    if let Some(amount) = request.amount {
        tags.push(value_tag(AMOUNT_TAG, amount.to_string()));
    }

    let mut rumor = EventBuilder::new(Kind::from(PAYMENT_RECEIPT_KIND), &request.message)
        .tags(tags)
        .custom_created_at(created_at)
        .build(buyer);
    rumor.ensure_id();
    rumor
}

/// Build and encrypt a new order for the merchant.
///
/// An order without items fails with [`Error::EmptyOrder`] before the signer
/// is touched. A new random order id is assigned on every call.
pub async fn encode_order(
    signer: &dyn NostrSigner,
    request: &OrderRequest,
    copy_to_self: bool,
) -> Result<OrderEnvelope> {
    request.check()?;

    let buyer = signer
        .get_public_key()
        .await
        .map_err(|e| Error::Signer(e.to_string()))?;
    let order_id = Uuid::new_v4().to_string();
    let now = Timestamp::now();
    let rumor = build_order_rumor(buyer, &order_id, request, now);

    seal_and_wrap(signer, order_id, rumor, request.merchant, now, copy_to_self).await
}

/// Build and encrypt a payment receipt for an existing order.
pub async fn encode_receipt(
    signer: &dyn NostrSigner,
    request: &ReceiptRequest,
    copy_to_self: bool,
) -> Result<OrderEnvelope> {
    if request.order_id.trim().is_empty() {
        return Err(Error::InvalidItem("receipt has no order id".to_string()));
    }
    let buyer = signer
        .get_public_key()
        .await
        .map_err(|e| Error::Signer(e.to_string()))?;
    let now = Timestamp::now();
    let rumor = build_receipt_rumor(buyer, request, now);

    seal_and_wrap(
        signer,
        request.order_id.clone(),
        rumor,
        request.merchant,
        now,
        copy_to_self,
    )
    .await
}
