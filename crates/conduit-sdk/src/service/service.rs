use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nostr_sdk::prelude::*;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::config::OrdersConfig;
use super::events::OrderNotification;
use super::relays::{build_relay_list_filter, parse_relay_list, select_publish_relays};
use crate::commerce::{
    ClassifiedEvent, CommerceEventType, OrderEnvelope, OrderRequest, PRODUCT_LISTING_KIND,
    ReceiptRequest, build_gift_wrap_filter, classify_rumor, encode_order, encode_receipt,
    process_gift_wrap,
};
use crate::error::{Error, Result};
use crate::expiration::unix_now;
use crate::orders::{
    NoopPersistence, OrderGroup, OrderPersistence, OrderStore, ProcessingStatus,
    StoredCommerceEvent, TimelineEntry, UnreadCounts,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay gateway for the buyer's order traffic.
///
/// Publishes gift-wrapped orders and receipts, subscribes to gift wraps
/// addressed to the user, and feeds classified messages into a shared
/// [`OrderStore`]. Every stored message is announced on a broadcast channel.
///
/// The subscription is rebuilt whenever the relay set changes. Each rebuild
/// bumps a generation counter; a loop that outlives its generation stops
/// without touching the store.
pub struct OrderService<P: OrderPersistence = NoopPersistence> {
    client: Client,
    keys: Keys,
    config: OrdersConfig,
    relays: Mutex<Vec<String>>,
    store: Arc<Mutex<OrderStore>>,
    persistence: Option<Arc<Mutex<P>>>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
    tx: broadcast::Sender<OrderNotification>,
}

impl OrderService<NoopPersistence> {
    /// Create a new `OrderService` without persistence.
    ///
    /// Returns the service and a broadcast receiver for order notifications.
    pub fn new(keys: Keys, config: OrdersConfig) -> (Self, broadcast::Receiver<OrderNotification>) {
        Self::build(keys, config, None, OrderStore::new())
    }
}

impl<P: OrderPersistence> OrderService<P> {
    /// Create a new `OrderService` backed by `persistence`.
    ///
    /// The saved snapshot, if any, is restored into the store. A snapshot
    /// that fails to load is logged and the store starts empty.
    pub fn with_persistence(
        keys: Keys,
        persistence: Arc<Mutex<P>>,
        config: OrdersConfig,
    ) -> (Self, broadcast::Receiver<OrderNotification>) {
        let restored = match persistence.lock() {
            Ok(mut p) => match p.load(&config.storage_key) {
                Ok(Some(snapshot)) => OrderStore::restore(snapshot),
                Ok(None) => OrderStore::new(),
                Err(e) => {
                    log::warn!("failed to load order snapshot: {e}");
                    OrderStore::new()
                }
            },
            Err(_) => {
                log::warn!("order persistence lock poisoned; starting empty");
                OrderStore::new()
            }
        };
        Self::build(keys, config, Some(persistence), restored)
    }

    fn build(
        keys: Keys,
        config: OrdersConfig,
        persistence: Option<Arc<Mutex<P>>>,
        store: OrderStore,
    ) -> (Self, broadcast::Receiver<OrderNotification>) {
        let (tx, rx) = broadcast::channel(256);
        let client = Client::new(keys.clone());
        (
            Self {
                client,
                keys,
                relays: Mutex::new(config.relays.clone()),
                config,
                store: Arc::new(Mutex::new(store)),
                persistence,
                generation: Arc::new(AtomicU64::new(0)),
                task: Mutex::new(None),
                tx,
            },
            rx,
        )
    }

    /// Get an additional broadcast receiver for order notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderNotification> {
        self.tx.subscribe()
    }

    /// Connect to the active relays and start the gift-wrap subscription.
    ///
    /// Any running subscription is torn down first.
    pub async fn start(&self) -> Result<()> {
        self.stop().await;

        for url in self.relays() {
            self.client
                .add_relay(url.as_str())
                .await
                .map_err(|e| Error::Relay(format!("failed to add relay {url}: {e}")))?;
        }
        self.client.connect_with_timeout(CONNECT_TIMEOUT).await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = LoopContext {
            client: self.client.clone(),
            keys: self.keys.clone(),
            store: self.store.clone(),
            persistence: self.persistence.clone(),
            storage_key: self.config.storage_key.clone(),
            generation: self.generation.clone(),
            tx: self.tx.clone(),
        };

        let handle = tokio::spawn(async move {
            run_subscription_loop(ctx, generation).await;
        });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
        log::info!("order subscription started (generation {generation})");
        Ok(())
    }

    /// Stop the subscription loop. The store is left intact.
    pub async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        let _ = self.client.unsubscribe_all().await;
    }

    /// Replace the active relay pool.
    ///
    /// Stored events are dropped because they were gathered from the old
    /// pool, then the subscription restarts against the new one.
    pub async fn set_relays(&self, relays: Vec<String>) -> Result<()> {
        self.stop().await;
        if let Err(e) = self.client.remove_all_relays().await {
            log::warn!("failed to drop old relays: {e}");
        }
        self.clear_store()?;
        if let Ok(mut current) = self.relays.lock() {
            *current = relays.clone();
        }
        let _ = self.tx.send(OrderNotification::RelaysChanged(relays));
        self.start().await
    }

    /// Tear everything down and forget all order data, including the
    /// persisted snapshot.
    pub async fn logout(&self) -> Result<()> {
        self.stop().await;
        if let Err(e) = self.client.remove_all_relays().await {
            log::warn!("failed to drop relays on logout: {e}");
        }
        self.clear_store()?;
        if let Some(persistence) = &self.persistence {
            let mut p = persistence.lock().map_err(|_| Error::LockPoisoned)?;
            p.delete(&self.config.storage_key)
                .map_err(Error::Persistence)?;
        }
        let _ = self.tx.send(OrderNotification::Cleared);
        log::info!("order state cleared on logout");
        Ok(())
    }

    /// Encode, publish and locally record a new order.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<OrderEnvelope> {
        let envelope = encode_order(&self.keys, request, self.config.copy_to_self).await?;
        self.send_envelope(&envelope).await?;
        let _ = self.tx.send(OrderNotification::OrderPlaced {
            order_id: envelope.order_id.clone(),
        });
        Ok(envelope)
    }

    /// Encode, publish and locally record a payment receipt.
    pub async fn send_receipt(&self, request: &ReceiptRequest) -> Result<OrderEnvelope> {
        let envelope = encode_receipt(&self.keys, request, self.config.copy_to_self).await?;
        self.send_envelope(&envelope).await?;
        Ok(envelope)
    }

    async fn send_envelope(&self, envelope: &OrderEnvelope) -> Result<()> {
        self.ensure_connected().await?;
        self.publish_gift_wrap(&envelope.gift_wrap, &envelope.recipient)
            .await?;

        if let Some(self_wrap) = &envelope.self_wrap {
            let pool = self.relays();
            if let Err(e) = self.send_to(&pool, self_wrap).await {
                log::warn!("failed to publish self copy of {}: {e}", envelope.order_id);
            }
        }

        match classify_rumor(envelope.rumor.clone()) {
            Ok(classified) => {
                self.ingest_local(classified);
            }
            Err(rejection) => {
                log::warn!("own message failed classification: {rejection}");
            }
        }
        Ok(())
    }

    fn ingest_local(&self, classified: ClassifiedEvent) {
        let mut event = StoredCommerceEvent::from(classified);
        event.unread = false;
        let Ok(mut store) = self.store.lock() else {
            return;
        };
        if store.add_event(event.clone()) {
            persist_snapshot(&self.persistence, &self.config.storage_key, &store);
            drop(store);
            let _ = self.tx.send(OrderNotification::EventStored(event));
        }
    }

    /// Publish `wrap` to the merchant's read relays plus the active pool.
    ///
    /// Returns the relays that accepted the event.
    pub async fn publish_gift_wrap(&self, wrap: &Event, merchant: &PublicKey) -> Result<Vec<String>> {
        let targets = self.resolve_publish_relays(merchant).await;
        self.send_to(&targets, wrap).await
    }

    /// Merchant NIP-65 read relays ∪ active pool. Falls back to the pool
    /// when the merchant has no relay list or it cannot be fetched.
    pub async fn resolve_publish_relays(&self, merchant: &PublicKey) -> Vec<String> {
        let merchant_relays = self.fetch_relay_list(merchant).await.unwrap_or_default();
        select_publish_relays(&merchant_relays, &self.relays())
    }

    /// The newest relay list published by `author`, if any.
    pub async fn fetch_relay_list(&self, author: &PublicKey) -> Option<Vec<String>> {
        if let Err(e) = self.ensure_connected().await {
            log::warn!("relay list lookup skipped: {e}");
            return None;
        }
        let filter = build_relay_list_filter(author);
        let events = match self
            .client
            .fetch_events(vec![filter], self.config.fetch_timeout)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                log::warn!("relay list lookup for {author} failed: {e}");
                return None;
            }
        };
        events
            .into_iter()
            .filter(|e| e.pubkey == *author)
            .max_by_key(|e| e.created_at)
            .map(|e| parse_relay_list(&e))
    }

    /// Profile metadata of `pubkey`, or `None` on timeout or absence.
    pub async fn fetch_profile(&self, pubkey: &PublicKey) -> Option<Metadata> {
        let filter = Filter::new().kind(Kind::Metadata).author(*pubkey).limit(1);
        let event = self.lookup(filter).await?;
        match Metadata::from_json(&event.content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::debug!("ignoring malformed profile for {pubkey}: {e}");
                None
            }
        }
    }

    /// Product listing `product_id` of `merchant`, or `None` on timeout or
    /// absence.
    pub async fn fetch_product(&self, merchant: &PublicKey, product_id: &str) -> Option<Event> {
        let filter = Filter::new()
            .kind(Kind::from(PRODUCT_LISTING_KIND))
            .author(*merchant)
            .identifier(product_id)
            .limit(1);
        self.lookup(filter).await
    }

    async fn lookup(&self, filter: Filter) -> Option<Event> {
        if let Err(e) = self.ensure_connected().await {
            log::warn!("lookup skipped: {e}");
            return None;
        }
        let timeout = self.config.lookup_timeout;
        match tokio::time::timeout(timeout, self.client.fetch_events(vec![filter], timeout)).await
        {
            Ok(Ok(events)) => events.into_iter().max_by_key(|e| e.created_at),
            Ok(Err(e)) => {
                log::warn!("lookup failed: {e}");
                None
            }
            Err(_) => {
                log::debug!("lookup timed out after {timeout:?}");
                None
            }
        }
    }

    // --- read model ---

    /// Shared handle to the order store.
    pub fn store(&self) -> Arc<Mutex<OrderStore>> {
        self.store.clone()
    }

    pub fn timeline(&self, order_id: &str) -> Result<Vec<TimelineEntry>> {
        let store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(store.timeline(order_id, unix_now()))
    }

    pub fn grouped_orders(&self) -> Result<Vec<OrderGroup>> {
        let store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(store.grouped_orders())
    }

    pub fn unread_counts(&self) -> Result<UnreadCounts> {
        let store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(store.unread_counts())
    }

    pub fn mark_as_read(&self, order_id: &str, event_type: CommerceEventType) -> Result<bool> {
        self.mutate(|store| store.mark_as_read(order_id, event_type))
    }

    pub fn mark_order_read(&self, order_id: &str) -> Result<usize> {
        self.mutate(|store| store.mark_order_read(order_id))
    }

    pub fn set_processing_status(
        &self,
        order_id: &str,
        event_type: CommerceEventType,
        status: ProcessingStatus,
    ) -> Result<bool> {
        self.mutate(|store| store.set_processing_status(order_id, event_type, status))
    }

    pub fn select_order(&self, order_id: Option<String>) -> Result<()> {
        self.mutate(|store| store.select_order(order_id))
    }

    /// The active relay pool.
    pub fn relays(&self) -> Vec<String> {
        self.relays
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|_| self.config.relays.clone())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    // --- internal helpers ---

    fn mutate<T>(&self, f: impl FnOnce(&mut OrderStore) -> T) -> Result<T> {
        let mut store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        let out = f(&mut store);
        persist_snapshot(&self.persistence, &self.config.storage_key, &store);
        Ok(out)
    }

    fn clear_store(&self) -> Result<()> {
        let mut store = self.store.lock().map_err(|_| Error::LockPoisoned)?;
        store.clear();
        persist_snapshot(&self.persistence, &self.config.storage_key, &store);
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.client.relays().await.is_empty() {
            for url in self.relays() {
                self.client
                    .add_relay(url.as_str())
                    .await
                    .map_err(|e| Error::Relay(format!("failed to add relay {url}: {e}")))?;
            }
            self.client.connect_with_timeout(CONNECT_TIMEOUT).await;
        }
        Ok(())
    }

    /// Publish `event` to `targets`. Relays outside the active pool are
    /// added write-only for this send and dropped again afterwards.
    async fn send_to(&self, targets: &[String], event: &Event) -> Result<Vec<String>> {
        let pool = self.relays();
        let mut transient = Vec::new();
        for url in targets {
            let in_pool = pool.iter().any(|p| same_relay(p, url));
            let added = if in_pool {
                self.client.add_relay(url.as_str()).await
            } else {
                self.client.add_write_relay(url.as_str()).await
            };
            match added {
                Ok(newly_added) => {
                    if newly_added && !in_pool {
                        transient.push(url.clone());
                    }
                    if let Err(e) = self.client.connect_relay(url.as_str()).await {
                        log::warn!("failed to connect to {url}: {e}");
                    }
                }
                Err(e) => log::warn!("skipping relay {url}: {e}"),
            }
        }

        let sent = self
            .client
            .send_event_to(targets.iter().map(String::as_str), event.clone())
            .await;

        for url in &transient {
            if let Err(e) = self.client.remove_relay(url.as_str()).await {
                log::warn!("failed to drop relay {url}: {e}");
            }
        }

        let output = sent.map_err(|e| Error::Publish(e.to_string()))?;
        if output.success.is_empty() {
            let reasons: Vec<String> = output
                .failed
                .iter()
                .map(|(url, reason)| format!("{url}: {reason:?}"))
                .collect();
            return Err(Error::Publish(format!(
                "no relay accepted event {}: {}",
                event.id,
                reasons.join(", ")
            )));
        }
        Ok(output.success.iter().map(|url| url.to_string()).collect())
    }
}

fn same_relay(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// State the subscription loop needs, detached from the service.
struct LoopContext<P: OrderPersistence> {
    client: Client,
    keys: Keys,
    store: Arc<Mutex<OrderStore>>,
    persistence: Option<Arc<Mutex<P>>>,
    storage_key: String,
    generation: Arc<AtomicU64>,
    tx: broadcast::Sender<OrderNotification>,
}

impl<P: OrderPersistence> LoopContext<P> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Background loop: decrypt, classify and store every gift wrap for the user.
async fn run_subscription_loop<P: OrderPersistence>(ctx: LoopContext<P>, generation: u64) {
    // Set up the notification receiver BEFORE subscribing so we don't miss events
    let mut notifications = ctx.client.notifications();

    let filter = build_gift_wrap_filter(&ctx.keys.public_key());
    if let Err(e) = ctx.client.subscribe(vec![filter], None).await {
        log::error!("failed to subscribe to gift wraps: {e}");
        return;
    }

    loop {
        let notification = match notifications.recv().await {
            Ok(notification) => notification,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("order subscription lagged, skipped {skipped} notifications");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if !ctx.is_current(generation) {
            break;
        }

        let event = match notification {
            RelayPoolNotification::Event { event, .. } => event,
            RelayPoolNotification::Shutdown => break,
            _ => continue,
        };
        if event.kind != Kind::GiftWrap {
            continue;
        }

        let classified = match process_gift_wrap(&ctx.keys, &event).await {
            Ok(classified) => classified,
            Err(rejection) => {
                log::debug!("dropping gift wrap {}: {rejection}", event.id);
                continue;
            }
        };

        let stored = StoredCommerceEvent::from(classified);
        let Ok(mut store) = ctx.store.lock() else {
            log::error!("order store lock poisoned; stopping subscription");
            break;
        };
        // Checked under the lock so a teardown that cleared the store wins.
        if !ctx.is_current(generation) {
            break;
        }
        if store.add_event(stored.clone()) {
            persist_snapshot(&ctx.persistence, &ctx.storage_key, &store);
            drop(store);
            let _ = ctx.tx.send(OrderNotification::EventStored(stored));
        }
    }
    log::debug!("order subscription loop (generation {generation}) exited");
}

fn persist_snapshot<P: OrderPersistence>(
    persistence: &Option<Arc<Mutex<P>>>,
    key: &str,
    store: &OrderStore,
) {
    let Some(persistence) = persistence else { return };
    if let Ok(mut p) = persistence.lock()
        && let Err(e) = p.save(key, &store.snapshot())
    {
        log::warn!("failed to persist orders: {e}");
    }
}
