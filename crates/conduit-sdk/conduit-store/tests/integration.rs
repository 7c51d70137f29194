use std::sync::{Arc, Mutex};

use conduit_sdk::nostr_sdk::Keys;
use conduit_sdk::testing::stored_event;
use conduit_sdk::{
    CommerceEventType, ORDERS_STORAGE_KEY, OrderPersistence, OrderService, OrderStore,
    OrdersConfig,
};
use conduit_store::{OrderStateStore, PersistedOrders};

// ==================== Test Helpers ====================

fn sample_snapshot() -> PersistedOrders {
    let mut store = OrderStore::new();
    store.add_event(stored_event(CommerceEventType::Order, "o-1", 100));
    store.add_event(stored_event(CommerceEventType::PaymentRequest, "o-1", 200));
    store.add_event(stored_event(CommerceEventType::Order, "o-2", 150));
    store.mark_as_read("o-1", CommerceEventType::Order);
    store.select_order(Some("o-1".to_string()));
    store.snapshot()
}

fn offline_config() -> OrdersConfig {
    OrdersConfig {
        relays: Vec::new(),
        ..Default::default()
    }
}

// ==================== Snapshot storage ====================

#[test]
fn missing_key_loads_nothing() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    assert!(store.load(ORDERS_STORAGE_KEY).unwrap().is_none());
    assert!(store.info(ORDERS_STORAGE_KEY).unwrap().is_none());
}

#[test]
fn save_then_load_in_memory() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    let snapshot = sample_snapshot();
    store.save(ORDERS_STORAGE_KEY, &snapshot).unwrap();

    let loaded = store.load(ORDERS_STORAGE_KEY).unwrap().unwrap();
    assert_eq!(loaded, snapshot);
    assert_eq!(loaded.selected_order.as_deref(), Some("o-1"));

    let info = store.info(ORDERS_STORAGE_KEY).unwrap().unwrap();
    assert_eq!(info.event_count, 3);
    assert_eq!(info.storage_key, ORDERS_STORAGE_KEY);
}

#[test]
fn save_overwrites_previous_snapshot() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    store.save(ORDERS_STORAGE_KEY, &sample_snapshot()).unwrap();
    store
        .save(ORDERS_STORAGE_KEY, &PersistedOrders::default())
        .unwrap();

    let loaded = store.load(ORDERS_STORAGE_KEY).unwrap().unwrap();
    assert_eq!(loaded.event_count(), 0);
    assert_eq!(store.keys().unwrap(), vec![ORDERS_STORAGE_KEY.to_string()]);
}

#[test]
fn keys_are_independent() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    store.save("alice", &sample_snapshot()).unwrap();
    store.save("bob", &PersistedOrders::default()).unwrap();

    assert!(store.delete("alice").unwrap());
    assert!(!store.delete("alice").unwrap());
    assert!(store.load("alice").unwrap().is_none());
    assert!(store.load("bob").unwrap().is_some());
    assert_eq!(store.keys().unwrap(), vec!["bob".to_string()]);
}

#[test]
fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.db");
    let path = path.to_str().unwrap();

    {
        let mut store = OrderStateStore::open(path).unwrap();
        store.save(ORDERS_STORAGE_KEY, &sample_snapshot()).unwrap();
    }

    let mut store = OrderStateStore::open(path).unwrap();
    assert_eq!(
        store.load(ORDERS_STORAGE_KEY).unwrap().unwrap(),
        sample_snapshot()
    );
}

#[test]
fn trait_delete_of_missing_key_is_ok() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    assert!(OrderPersistence::delete(&mut store, "never-saved").is_ok());
}

// ==================== OrderService wiring ====================

#[tokio::test]
async fn service_restores_and_persists_through_sqlite() {
    let mut store = OrderStateStore::open_in_memory().unwrap();
    store.save(ORDERS_STORAGE_KEY, &sample_snapshot()).unwrap();
    let handle = Arc::new(Mutex::new(store));

    let (service, _rx) =
        OrderService::with_persistence(Keys::generate(), handle.clone(), offline_config());
    assert_eq!(service.store().lock().unwrap().len(), 3);
    assert_eq!(service.unread_counts().unwrap().total(), 2);

    service.mark_order_read("o-1").unwrap();
    service.select_order(Some("o-2".to_string())).unwrap();

    let saved = handle
        .lock()
        .unwrap()
        .load(ORDERS_STORAGE_KEY)
        .unwrap()
        .unwrap();
    assert_eq!(saved.selected_order.as_deref(), Some("o-2"));
    assert!(saved.payment_requests.iter().all(|e| !e.unread));
}
