//! Command surface for the UI.
//!
//! Every function takes the shared [`ConduitApp`] and returns either a
//! camelCase DTO or a `String` error the frontend can show as-is.

use conduit_sdk::nostr_sdk::prelude::*;
use conduit_sdk::{
    CommerceEventType, ContactInfo, LightningInvoiceInfo, OrderEnvelope, OrderGroup, OrderItem,
    OrderRequest, PaymentMethod, ProcessingStatus, ReceiptRequest, ResolvedExpiration,
    ShippingSelection, TimelineEntry, UnreadCounts, expiration_of, parse_bolt11,
};
use serde::{Deserialize, Serialize};

use crate::ConduitApp;
use crate::identity::{self, IdentityResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    /// Merchant pubkey, hex or npub.
    pub merchant_pubkey: String,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub shipping: Option<ShippingSelection>,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceiptRequest {
    pub merchant_pubkey: String,
    pub order_id: String,
    pub medium: String,
    pub target: String,
    #[serde(default)]
    pub proof: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub message: String,
}

/// Outcome of sending an order or receipt. Failures are reported in-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    pub message: String,
    pub order_id: Option<String>,
}

impl OrderResponse {
    fn sent(envelope: &OrderEnvelope, message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            order_id: Some(envelope.order_id.clone()),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            order_id: None,
        }
    }
}

/// Payment deadline of an order with a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentExpirationResponse {
    #[serde(flatten)]
    pub expiration: ResolvedExpiration,
    pub label: Option<String>,
}

fn parse_pubkey(value: &str) -> Result<PublicKey, String> {
    PublicKey::parse(value.trim()).map_err(|e| format!("invalid pubkey: {e}"))
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub fn get_nostr_identity(app: &ConduitApp) -> Result<IdentityResponse, String> {
    IdentityResponse::from_keys(&app.keys()?)
}

pub fn export_nostr_nsec(app: &ConduitApp) -> Result<String, String> {
    app.keys()?
        .secret_key()
        .to_bech32()
        .map_err(|e| format!("bech32 error: {e}"))
}

/// Switch to the identity in `nsec`. Orders stored for the previous identity
/// are dropped.
pub async fn import_nostr_nsec(app: &ConduitApp, nsec: String) -> Result<IdentityResponse, String> {
    let keys = identity::parse_nsec(&nsec)?;
    let response = IdentityResponse::from_keys(&keys)?;
    app.replace_identity(keys.clone()).await?;
    identity::save_keys(&app.app_data_dir()?, &keys)?;
    Ok(response)
}

/// Forget the saved identity and its orders. The session continues under a
/// throwaway keypair that is not written to disk; the next launch generates
/// and saves a new one.
pub async fn delete_nostr_identity(app: &ConduitApp) -> Result<IdentityResponse, String> {
    let keys = Keys::generate();
    let response = IdentityResponse::from_keys(&keys)?;
    app.replace_identity(keys).await?;
    identity::delete_keys(&app.app_data_dir()?)?;
    log::info!("nostr identity deleted");
    Ok(response)
}

// ---------------------------------------------------------------------------
// App state & relays
// ---------------------------------------------------------------------------

pub fn get_app_state(app: &ConduitApp) -> Result<AppState, String> {
    app.with_manager(|m| Ok(m.snapshot()))
}

pub fn get_relay_list(app: &ConduitApp) -> Result<Vec<String>, String> {
    app.with_manager(|m| Ok(m.relays().to_vec()))
}

/// Replace the relay pool. Stored orders are cleared and refetched from the
/// new relays.
pub async fn set_relay_list(app: &ConduitApp, relays: Vec<String>) -> Result<AppState, String> {
    let mut normalized: Vec<String> = Vec::with_capacity(relays.len());
    for url in &relays {
        let url = RelayUrl::parse(url.trim()).map_err(|e| format!("invalid relay {url}: {e}"))?;
        let url = url.to_string();
        if !normalized.contains(&url) {
            normalized.push(url);
        }
    }
    if normalized.is_empty() {
        return Err("at least one relay is required".to_string());
    }

    let state = app.with_manager(|m| m.set_relays(normalized.clone()))?;
    app.orders()
        .await
        .set_relays(normalized)
        .await
        .map_err(|e| e.to_string())?;
    Ok(state)
}

pub async fn add_relay(app: &ConduitApp, url: String) -> Result<AppState, String> {
    let mut relays = get_relay_list(app)?;
    relays.push(url);
    set_relay_list(app, relays).await
}

pub async fn remove_relay(app: &ConduitApp, url: String) -> Result<AppState, String> {
    let target = url.trim().trim_end_matches('/');
    let relays = get_relay_list(app)?
        .into_iter()
        .filter(|r| r.trim_end_matches('/') != target)
        .collect();
    set_relay_list(app, relays).await
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

pub async fn place_order(app: &ConduitApp, request: PlaceOrderRequest) -> OrderResponse {
    let merchant = match parse_pubkey(&request.merchant_pubkey) {
        Ok(pk) => pk,
        Err(e) => return OrderResponse::failed(e),
    };
    let order = OrderRequest {
        merchant,
        items: request.items,
        shipping: request.shipping,
        contact: request.contact,
        message: request.message,
    };
    match app.orders().await.place_order(&order).await {
        Ok(envelope) => OrderResponse::sent(&envelope, "Order placed"),
        Err(e) => {
            log::warn!("order to {merchant} failed: {e}");
            OrderResponse::failed(e.to_string())
        }
    }
}

pub async fn send_payment_receipt(
    app: &ConduitApp,
    request: PaymentReceiptRequest,
) -> OrderResponse {
    let merchant = match parse_pubkey(&request.merchant_pubkey) {
        Ok(pk) => pk,
        Err(e) => return OrderResponse::failed(e),
    };
    let receipt = ReceiptRequest {
        merchant,
        order_id: request.order_id,
        payment: PaymentMethod {
            medium: request.medium,
            target: request.target,
            proof: request.proof,
        },
        amount: request.amount,
        message: request.message,
    };
    match app.orders().await.send_receipt(&receipt).await {
        Ok(envelope) => OrderResponse::sent(&envelope, "Receipt sent"),
        Err(e) => {
            log::warn!("receipt for {} failed: {e}", receipt.order_id);
            OrderResponse::failed(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

pub async fn list_orders(app: &ConduitApp) -> Result<Vec<OrderGroup>, String> {
    app.orders().await.grouped_orders().map_err(|e| e.to_string())
}

pub async fn get_order_timeline(
    app: &ConduitApp,
    order_id: String,
) -> Result<Vec<TimelineEntry>, String> {
    app.orders()
        .await
        .timeline(&order_id)
        .map_err(|e| e.to_string())
}

pub async fn get_unread_counts(app: &ConduitApp) -> Result<UnreadCounts, String> {
    app.orders().await.unread_counts().map_err(|e| e.to_string())
}

pub async fn mark_order_read(app: &ConduitApp, order_id: String) -> Result<usize, String> {
    app.orders()
        .await
        .mark_order_read(&order_id)
        .map_err(|e| e.to_string())
}

pub async fn mark_event_read(
    app: &ConduitApp,
    order_id: String,
    event_type: CommerceEventType,
) -> Result<bool, String> {
    app.orders()
        .await
        .mark_as_read(&order_id, event_type)
        .map_err(|e| e.to_string())
}

pub async fn set_processing_status(
    app: &ConduitApp,
    order_id: String,
    event_type: CommerceEventType,
    status: ProcessingStatus,
) -> Result<bool, String> {
    app.orders()
        .await
        .set_processing_status(&order_id, event_type, status)
        .map_err(|e| e.to_string())
}

pub async fn select_order(app: &ConduitApp, order_id: Option<String>) -> Result<(), String> {
    app.orders()
        .await
        .select_order(order_id)
        .map_err(|e| e.to_string())
}

/// Deadline of the payment request stored for `order_id`, if one arrived.
pub async fn get_payment_expiration(
    app: &ConduitApp,
    order_id: String,
) -> Result<Option<PaymentExpirationResponse>, String> {
    let orders = app.orders().await;
    let store = orders.store();
    let store = store
        .lock()
        .map_err(|_| "order store lock failed".to_string())?;
    Ok(store
        .get(CommerceEventType::PaymentRequest, &order_id)
        .map(|request| {
            let expiration = expiration_of(&request.raw_event, now_secs());
            PaymentExpirationResponse {
                label: expiration.label(),
                expiration,
            }
        }))
}

pub fn parse_lightning_invoice(bolt11: String) -> Result<LightningInvoiceInfo, String> {
    parse_bolt11(&bolt11).ok_or_else(|| "not a valid BOLT11 invoice".to_string())
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub async fn fetch_merchant_profile(
    app: &ConduitApp,
    pubkey: String,
) -> Result<Option<Metadata>, String> {
    let pubkey = parse_pubkey(&pubkey)?;
    Ok(app.orders().await.fetch_profile(&pubkey).await)
}

/// Newest listing for `product_id`, as event JSON.
pub async fn fetch_product(
    app: &ConduitApp,
    merchant_pubkey: String,
    product_id: String,
) -> Result<Option<String>, String> {
    let merchant = parse_pubkey(&merchant_pubkey)?;
    Ok(app
        .orders()
        .await
        .fetch_product(&merchant, &product_id)
        .await
        .map(|event| event.as_json()))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Drop every stored order message and the saved snapshot.
pub async fn logout(app: &ConduitApp) -> Result<(), String> {
    app.orders().await.logout().await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_request_accepts_minimal_json() {
        let json = r#"{
            "merchantPubkey": "npub1xyz",
            "items": [{"productId": "mug", "quantity": 1, "price": 100}]
        }"#;
        let request: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.items.len(), 1);
        assert!(request.shipping.is_none());
        assert_eq!(request.contact, ContactInfo::default());
        assert!(request.message.is_empty());
    }

    #[test]
    fn failed_response_has_no_order_id() {
        let json = serde_json::to_string(&OrderResponse::failed("nope".to_string())).unwrap();
        assert_eq!(json, r#"{"success":false,"message":"nope","orderId":null}"#);
    }

    #[test]
    fn pubkeys_parse_from_hex_and_npub() {
        let keys = Keys::generate();
        let hex = keys.public_key().to_hex();
        let npub = keys.public_key().to_bech32().unwrap();
        assert_eq!(parse_pubkey(&hex).unwrap(), keys.public_key());
        assert_eq!(parse_pubkey(&npub).unwrap(), keys.public_key());
        assert!(parse_pubkey("not-a-key").is_err());
    }

    #[test]
    fn garbage_invoice_is_an_error() {
        assert!(parse_lightning_invoice("lnbc1garbage".to_string()).is_err());
    }

    #[test]
    fn expiration_response_flattens() {
        let response = PaymentExpirationResponse {
            expiration: conduit_sdk::resolve_expiration(std::iter::empty::<&Tag>(), None, 100),
            label: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["source"], "none");
        assert!(json.get("expiration").is_none());
    }
}
