use std::path::Path;
use std::time::Duration;

use conduit_lib::ConduitApp;
use conduit_lib::commands::{self, PlaceOrderRequest};
use conduit_sdk::testing::{commerce_rumor, wrap_rumor};
use conduit_sdk::{
    CommerceEventType, ContactInfo, ExpirySource, OrderItem, OrderNotification, ShippingSelection,
};
use nostr_relay_builder::prelude::*;
use nostr_sdk::prelude::*;

fn write_config(dir: &Path, relay: &str) {
    let config = serde_json::json!({ "relays": [relay], "logLevel": "debug" });
    std::fs::write(dir.join("conduit_config.json"), config.to_string()).unwrap();
}

fn order_json(merchant: &PublicKey) -> PlaceOrderRequest {
    PlaceOrderRequest {
        merchant_pubkey: merchant.to_bech32().unwrap(),
        items: vec![OrderItem {
            product_id: "tee".to_string(),
            quantity: 1,
            price: 21_000,
        }],
        shipping: Some(ShippingSelection {
            method_id: "pickup".to_string(),
            cost: 0,
        }),
        contact: ContactInfo {
            email: Some("buyer@example.com".to_string()),
            ..Default::default()
        },
        message: String::new(),
    }
}

async fn wait_for_stored(rx: &mut tokio::sync::broadcast::Receiver<OrderNotification>) {
    loop {
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a stored event")
            .expect("notification channel closed");
        if matches!(notification, OrderNotification::EventStored(_)) {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_open_writes_config_and_identity() {
    let dir = tempfile::tempdir().unwrap();
    let app = ConduitApp::open(dir.path()).unwrap();
    assert!(dir.path().join("conduit_config.json").exists());
    assert!(dir.path().join("nostr_identity.key").exists());
    assert!(dir.path().join(conduit_lib::ORDERS_DB_FILE).exists());

    let first = commands::get_nostr_identity(&app).unwrap();
    drop(app);
    let reopened = ConduitApp::open(dir.path()).unwrap();
    assert_eq!(commands::get_nostr_identity(&reopened).unwrap(), first);
}

#[tokio::test]
async fn placed_order_survives_restart() {
    let mock = MockRelay::run().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &mock.url());
    let merchant = Keys::generate();

    let order_id = {
        let app = ConduitApp::open(dir.path()).unwrap();
        let response = commands::place_order(&app, order_json(&merchant.public_key())).await;
        assert!(response.success, "{}", response.message);
        let order_id = response.order_id.unwrap();
        let groups = commands::list_orders(&app).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].order_id, order_id);
        order_id
    };

    let app = ConduitApp::open(dir.path()).unwrap();
    let timeline = commands::get_order_timeline(&app, order_id.clone())
        .await
        .unwrap();
    // The order plus the awaiting-merchant marker.
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].event().unwrap().order_id, order_id);
}

#[tokio::test]
async fn bad_merchant_key_fails_in_band() {
    let dir = tempfile::tempdir().unwrap();
    let app = ConduitApp::open(dir.path()).unwrap();
    let mut request = order_json(&Keys::generate().public_key());
    request.merchant_pubkey = "npub1broken".to_string();

    let response = commands::place_order(&app, request).await;
    assert!(!response.success);
    assert!(response.order_id.is_none());
    assert!(response.message.starts_with("invalid pubkey"));
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = ConduitApp::open(dir.path()).unwrap();
    let mut request = order_json(&Keys::generate().public_key());
    request.items.clear();

    let response = commands::place_order(&app, request).await;
    assert!(!response.success);
    assert!(commands::list_orders(&app).await.unwrap().is_empty());
}

#[tokio::test]
async fn relay_list_is_validated_and_saved() {
    let mock = MockRelay::run().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let app = ConduitApp::open(dir.path()).unwrap();

    assert!(
        commands::set_relay_list(&app, vec!["not a relay".to_string()])
            .await
            .is_err()
    );
    assert!(commands::set_relay_list(&app, Vec::new()).await.is_err());

    let url = mock.url().to_string();
    let state = commands::set_relay_list(&app, vec![url.clone(), url])
        .await
        .unwrap();
    assert_eq!(state.relays.len(), 1);
    assert_eq!(state.revision, 1);

    drop(app);
    let reopened = ConduitApp::open(dir.path()).unwrap();
    assert_eq!(commands::get_relay_list(&reopened).unwrap(), state.relays);
}

#[tokio::test]
async fn merchant_payment_request_reports_deadline() {
    let mock = MockRelay::run().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &mock.url());
    let app = ConduitApp::open(dir.path()).unwrap();
    let mut rx = app.subscribe();
    app.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let buyer = app.keys().unwrap().public_key();
    let merchant = Keys::generate();
    let deadline = Timestamp::now().as_u64() + 600;
    let deadline_tag = deadline.to_string();
    let rumor = commerce_rumor(
        merchant.public_key(),
        buyer,
        CommerceEventType::PaymentRequest,
        "order-1",
        Timestamp::now().as_u64(),
        &[("expiration", deadline_tag.as_str())],
    );
    let wrap = wrap_rumor(&merchant, &rumor, &buyer).await;
    let client = Client::new(merchant.clone());
    client.add_relay(mock.url()).await.unwrap();
    client.connect().await;
    client.send_event(wrap).await.unwrap();

    wait_for_stored(&mut rx).await;
    let response = commands::get_payment_expiration(&app, "order-1".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.expiration.source, ExpirySource::Nostr);
    assert_eq!(response.expiration.expires_at, Some(deadline));
    assert!(!response.expiration.is_expired);
    assert!(response.label.unwrap().ends_with("left"));

    let unread = commands::get_unread_counts(&app).await.unwrap();
    assert_eq!(unread.payment_requests, 1);
    let marked = commands::mark_order_read(&app, "order-1".to_string())
        .await
        .unwrap();
    assert_eq!(marked, 1);
    assert_eq!(commands::get_unread_counts(&app).await.unwrap().total(), 0);
}

#[tokio::test]
async fn importing_identity_drops_previous_orders() {
    let mock = MockRelay::run().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &mock.url());
    let app = ConduitApp::open(dir.path()).unwrap();
    let response = commands::place_order(&app, order_json(&Keys::generate().public_key())).await;
    assert!(response.success, "{}", response.message);

    let other = Keys::generate();
    let nsec = other.secret_key().to_bech32().unwrap();
    let identity = commands::import_nostr_nsec(&app, nsec.clone()).await.unwrap();
    assert_eq!(identity.pubkey_hex, other.public_key().to_hex());
    assert_eq!(commands::export_nostr_nsec(&app).unwrap(), nsec);
    assert!(commands::list_orders(&app).await.unwrap().is_empty());

    app.stop().await;
    drop(app);
    let reopened = ConduitApp::open(dir.path()).unwrap();
    assert!(commands::list_orders(&reopened).await.unwrap().is_empty());
    assert_eq!(
        commands::get_nostr_identity(&reopened).unwrap().pubkey_hex,
        other.public_key().to_hex()
    );
}

#[tokio::test]
async fn rejected_import_keeps_saved_identity() {
    let dir = tempfile::tempdir().unwrap();
    let app = ConduitApp::open(dir.path()).unwrap();
    let before = commands::get_nostr_identity(&app).unwrap();

    assert!(
        commands::import_nostr_nsec(&app, "nsec1notakey".to_string())
            .await
            .is_err()
    );
    assert_eq!(commands::get_nostr_identity(&app).unwrap(), before);
    drop(app);
    let reopened = ConduitApp::open(dir.path()).unwrap();
    assert_eq!(commands::get_nostr_identity(&reopened).unwrap(), before);
}

#[tokio::test]
async fn deleted_identity_is_not_restored() {
    let mock = MockRelay::run().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), &mock.url());
    let app = ConduitApp::open(dir.path()).unwrap();
    let original = commands::get_nostr_identity(&app).unwrap();
    let response = commands::place_order(&app, order_json(&Keys::generate().public_key())).await;
    assert!(response.success, "{}", response.message);

    let throwaway = commands::delete_nostr_identity(&app).await.unwrap();
    assert_ne!(throwaway, original);
    assert_eq!(commands::get_nostr_identity(&app).unwrap(), throwaway);
    assert!(!dir.path().join("nostr_identity.key").exists());
    assert!(commands::list_orders(&app).await.unwrap().is_empty());

    app.stop().await;
    drop(app);
    let reopened = ConduitApp::open(dir.path()).unwrap();
    let fresh = commands::get_nostr_identity(&reopened).unwrap();
    assert_ne!(fresh, original);
    assert_ne!(fresh, throwaway);
    assert!(dir.path().join("nostr_identity.key").exists());
}
