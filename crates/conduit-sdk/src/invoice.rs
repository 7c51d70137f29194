//! BOLT11 invoice inspection for payment requests.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use lightning_invoice::{Bolt11Invoice, Bolt11InvoiceDescriptionRef};
use nostr_sdk::prelude::Tag;
use serde::{Deserialize, Serialize};

use crate::commerce::{LIGHTNING_MEDIUM, PAYMENT_TAG};

/// Fields decoded from a BOLT11 invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightningInvoiceInfo {
    pub bolt11: String,
    /// Amount in millisatoshis; `None` for amount-less invoices.
    pub amount_msat: Option<u64>,
    /// Amount in whole satoshis (msat / 1000, rounded down).
    pub amount_sat: Option<u64>,
    pub description: Option<String>,
    /// Creation time, seconds since the epoch.
    pub timestamp: u64,
    /// Seconds after `timestamp` at which the invoice expires.
    pub expiry: u64,
    /// Hex payment hash.
    pub payment_hash: String,
    /// Hex compact signature.
    pub signature: String,
    pub is_valid: bool,
}

impl LightningInvoiceInfo {
    /// Absolute expiry, seconds since the epoch.
    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(self.expiry)
    }

    /// Expiry instant rendered as RFC 3339, if representable.
    pub fn expires_at_rfc3339(&self) -> Option<String> {
        let secs = i64::try_from(self.expires_at()).ok()?;
        DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at()
    }
}

/// Decode a BOLT11 string. Returns `None` for anything that does not parse.
pub fn parse_bolt11(bolt11: &str) -> Option<LightningInvoiceInfo> {
    let trimmed = bolt11.trim();
    let trimmed = trimmed
        .strip_prefix("lightning:")
        .or_else(|| trimmed.strip_prefix("LIGHTNING:"))
        .unwrap_or(trimmed);

    let invoice = match Bolt11Invoice::from_str(trimmed) {
        Ok(invoice) => invoice,
        Err(e) => {
            log::debug!("ignoring malformed bolt11 invoice: {e}");
            return None;
        }
    };

    let amount_msat = invoice.amount_milli_satoshis();
    let description = match invoice.description() {
        Bolt11InvoiceDescriptionRef::Direct(desc) => Some(desc.to_string()),
        Bolt11InvoiceDescriptionRef::Hash(_) => None,
    }
    .filter(|d| !d.is_empty());
    let is_valid = invoice.check_signature().is_ok();
    let payment_hash = invoice.payment_hash().to_string();
    let timestamp = invoice.duration_since_epoch().as_secs();
    let expiry = invoice.expiry_time().as_secs();
    let (_, compact) = invoice
        .clone()
        .into_signed_raw()
        .signature()
        .0
        .serialize_compact();

    Some(LightningInvoiceInfo {
        bolt11: trimmed.to_string(),
        amount_msat,
        amount_sat: amount_msat.map(|msat| msat / 1000),
        description,
        timestamp,
        expiry,
        payment_hash,
        signature: hex::encode(compact),
        is_valid,
    })
}

/// The BOLT11 string in the first `["payment", "lightning", <invoice>, ...]` tag.
pub fn lightning_invoice_of<'a, I>(tags: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a Tag>,
{
    tags.into_iter().find_map(|tag| match tag.as_slice() {
        [name, medium, invoice, ..] if name == PAYMENT_TAG && medium == LIGHTNING_MEDIUM => {
            Some(invoice.as_str())
        }
        _ => None,
    })
}
