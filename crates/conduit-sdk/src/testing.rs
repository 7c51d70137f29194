//! Shared fixtures for unit and integration tests.
//!
//! Builds well-formed commerce rumors for every message type, signed BOLT11
//! invoices with a fixed creation time, and an in-memory persistence backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitcoin::hashes::Hash as _;
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
use nostr_sdk::prelude::*;

use crate::commerce::{
    AMOUNT_TAG, CommerceEventType, ITEM_TAG, ORDER_TAG, PAYMENT_TAG, STATUS_TAG, TYPE_TAG,
    classify_rumor, gift_wrap_seal, seal_rumor, value_tag, values_tag,
};
use crate::orders::{OrderPersistence, PersistedOrders, StoredCommerceEvent};

/// Creation time of every invoice from [`signed_invoice`].
pub const INVOICE_TIMESTAMP: u64 = 1_700_000_000;

/// A BOLT11 invoice created at [`INVOICE_TIMESTAMP`] with a zero payment hash.
pub fn signed_invoice(amount_msat: Option<u64>, expiry_secs: u64, description: &str) -> String {
    let secp = Secp256k1::new();
    let private_key = SecretKey::from_slice(&[42u8; 32]).expect("valid secret key");
    let payment_hash = sha256::Hash::from_slice(&[0u8; 32]).expect("32-byte hash");

    let builder = InvoiceBuilder::new(Currency::Bitcoin)
        .description(description.to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([42u8; 32]))
        .duration_since_epoch(Duration::from_secs(INVOICE_TIMESTAMP))
        .min_final_cltv_expiry_delta(144)
        .expiry_time(Duration::from_secs(expiry_secs));

    let invoice = match amount_msat {
        Some(msat) => builder
            .amount_milli_satoshis(msat)
            .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &private_key)),
        None => builder.build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &private_key)),
    };
    invoice.expect("build invoice").to_string()
}

/// Tags that make a rumor of `event_type` pass validation.
fn required_tags(event_type: CommerceEventType, counterparty: PublicKey) -> Vec<Tag> {
    let merchant = counterparty.to_hex();
    match event_type {
        CommerceEventType::Order => vec![
            Tag::public_key(counterparty),
            value_tag(AMOUNT_TAG, "1000"),
            values_tag(ITEM_TAG, vec![format!("30402:{merchant}:item"), "1".into()]),
        ],
        CommerceEventType::PaymentRequest => vec![
            Tag::public_key(counterparty),
            value_tag(AMOUNT_TAG, "1000"),
            values_tag(PAYMENT_TAG, vec!["bitcoin".into(), "bc1qfixture".into()]),
        ],
        CommerceEventType::StatusUpdate => vec![value_tag(STATUS_TAG, "confirmed")],
        CommerceEventType::ShippingUpdate => vec![value_tag(STATUS_TAG, "shipped")],
        CommerceEventType::PaymentReceipt => vec![
            Tag::public_key(counterparty),
            values_tag(PAYMENT_TAG, vec!["lightning".into(), "lnbc1fixture".into()]),
        ],
    }
}

/// A valid rumor of `event_type` for `order_id` authored by `author`.
///
/// `extra` tags are appended after the required ones and win on lookups only
/// if the required set lacks that tag name.
pub fn commerce_rumor(
    author: PublicKey,
    counterparty: PublicKey,
    event_type: CommerceEventType,
    order_id: &str,
    created_at: u64,
    extra: &[(&str, &str)],
) -> UnsignedEvent {
    let mut tags = required_tags(event_type, counterparty);
    tags.push(value_tag(ORDER_TAG, order_id));
    if let Some(type_tag) = event_type.type_tag() {
        tags.push(value_tag(TYPE_TAG, type_tag));
    }
    tags.extend(extra.iter().map(|(name, value)| value_tag(name, *value)));

    let mut rumor = EventBuilder::new(Kind::from(event_type.kind()), "")
        .tags(tags)
        .custom_created_at(Timestamp::from(created_at))
        .build(author);
    rumor.ensure_id();
    rumor
}

/// A stored event as the classifier would produce it.
pub fn stored_event(
    event_type: CommerceEventType,
    order_id: &str,
    created_at: u64,
) -> StoredCommerceEvent {
    stored_event_with(event_type, order_id, created_at, &[])
}

/// A stored payment request carrying `extra` tags (e.g. `expiration`).
pub fn payment_request_event(
    order_id: &str,
    created_at: u64,
    extra: &[(&str, &str)],
) -> StoredCommerceEvent {
    stored_event_with(CommerceEventType::PaymentRequest, order_id, created_at, extra)
}

fn stored_event_with(
    event_type: CommerceEventType,
    order_id: &str,
    created_at: u64,
    extra: &[(&str, &str)],
) -> StoredCommerceEvent {
    let author = Keys::generate().public_key();
    let counterparty = Keys::generate().public_key();
    let rumor = commerce_rumor(author, counterparty, event_type, order_id, created_at, extra);
    classify_rumor(rumor).expect("fixture rumor is valid").into()
}

/// Seal `rumor` with `sender` and gift-wrap it to `receiver`.
pub async fn wrap_rumor(sender: &Keys, rumor: &UnsignedEvent, receiver: &PublicKey) -> Event {
    let now = Timestamp::now();
    let seal = seal_rumor(sender, rumor, receiver, now)
        .await
        .expect("seal rumor");
    gift_wrap_seal(&seal, receiver, now).expect("wrap seal")
}

/// In-memory persistence whose contents tests can inspect.
#[derive(Clone, Default)]
pub struct TestPersistence {
    saved: Arc<Mutex<HashMap<String, PersistedOrders>>>,
}

impl TestPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self, key: &str) -> Option<PersistedOrders> {
        self.saved.lock().ok()?.get(key).cloned()
    }
}

impl OrderPersistence for TestPersistence {
    fn load(&mut self, key: &str) -> Result<Option<PersistedOrders>, String> {
        let saved = self.saved.lock().map_err(|_| "lock poisoned".to_string())?;
        Ok(saved.get(key).cloned())
    }

    fn save(&mut self, key: &str, orders: &PersistedOrders) -> Result<(), String> {
        let mut saved = self.saved.lock().map_err(|_| "lock poisoned".to_string())?;
        saved.insert(key.to_string(), orders.clone());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), String> {
        let mut saved = self.saved.lock().map_err(|_| "lock poisoned".to_string())?;
        saved.remove(key);
        Ok(())
    }
}
