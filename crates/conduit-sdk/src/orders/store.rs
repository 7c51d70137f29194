use std::collections::HashMap;

use nostr_sdk::prelude::UnsignedEvent;
use serde::{Deserialize, Serialize};

use crate::commerce::{ClassifiedEvent, CommerceEventType, CommerceMessage};

/// Local handling state of a stored event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

/// One validated commerce message as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCommerceEvent {
    /// Hex rumor id.
    pub id: String,
    pub order_id: String,
    /// Decrypted inner event. Rumors carry no signature.
    pub raw_event: UnsignedEvent,
    pub event_type: CommerceEventType,
    pub details: CommerceMessage,
    pub unread: bool,
    /// `created_at` of the rumor, seconds.
    pub timestamp: u64,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
}

impl From<ClassifiedEvent> for StoredCommerceEvent {
    fn from(event: ClassifiedEvent) -> Self {
        Self {
            id: event.id(),
            timestamp: event.timestamp(),
            order_id: event.order_id,
            event_type: event.event_type,
            details: event.message,
            raw_event: event.rumor,
            unread: true,
            processing_status: ProcessingStatus::Pending,
        }
    }
}

/// Unread events per partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounts {
    pub orders: usize,
    pub payment_requests: usize,
    pub status_updates: usize,
    pub shipping_updates: usize,
    pub payment_receipts: usize,
}

impl UnreadCounts {
    pub fn get(&self, event_type: CommerceEventType) -> usize {
        match event_type {
            CommerceEventType::Order => self.orders,
            CommerceEventType::PaymentRequest => self.payment_requests,
            CommerceEventType::StatusUpdate => self.status_updates,
            CommerceEventType::ShippingUpdate => self.shipping_updates,
            CommerceEventType::PaymentReceipt => self.payment_receipts,
        }
    }

    fn slot(&mut self, event_type: CommerceEventType) -> &mut usize {
        match event_type {
            CommerceEventType::Order => &mut self.orders,
            CommerceEventType::PaymentRequest => &mut self.payment_requests,
            CommerceEventType::StatusUpdate => &mut self.status_updates,
            CommerceEventType::ShippingUpdate => &mut self.shipping_updates,
            CommerceEventType::PaymentReceipt => &mut self.payment_receipts,
        }
    }

    pub fn total(&self) -> usize {
        CommerceEventType::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

/// Serialized form of the store: the five partitions plus the selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedOrders {
    #[serde(default)]
    pub orders: Vec<StoredCommerceEvent>,
    #[serde(default)]
    pub payment_requests: Vec<StoredCommerceEvent>,
    #[serde(default)]
    pub status_updates: Vec<StoredCommerceEvent>,
    #[serde(default)]
    pub shipping_updates: Vec<StoredCommerceEvent>,
    #[serde(default)]
    pub payment_receipts: Vec<StoredCommerceEvent>,
    #[serde(default)]
    pub selected_order: Option<String>,
}

impl PersistedOrders {
    /// Number of events across all partitions.
    pub fn event_count(&self) -> usize {
        self.orders.len()
            + self.payment_requests.len()
            + self.status_updates.len()
            + self.shipping_updates.len()
            + self.payment_receipts.len()
    }

    fn partition_mut(&mut self, event_type: CommerceEventType) -> &mut Vec<StoredCommerceEvent> {
        match event_type {
            CommerceEventType::Order => &mut self.orders,
            CommerceEventType::PaymentRequest => &mut self.payment_requests,
            CommerceEventType::StatusUpdate => &mut self.status_updates,
            CommerceEventType::ShippingUpdate => &mut self.shipping_updates,
            CommerceEventType::PaymentReceipt => &mut self.payment_receipts,
        }
    }
}

/// In-memory order store, one partition per event type keyed by order id.
///
/// The first event stored for a `(type, order_id)` pair wins; later arrivals
/// for the same pair are dropped. Relays deliver the same wrap more than once,
/// so ingestion has to be idempotent.
#[derive(Debug, Clone, Default)]
pub struct OrderStore {
    partitions: HashMap<CommerceEventType, HashMap<String, StoredCommerceEvent>>,
    selected_order: Option<String>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `event` unless its `(type, order_id)` slot is taken.
    ///
    /// Returns `true` when the event was stored.
    pub fn add_event(&mut self, event: StoredCommerceEvent) -> bool {
        let partition = self.partitions.entry(event.event_type).or_default();
        if partition.contains_key(&event.order_id) {
            log::debug!(
                "dropping duplicate {} for order {}",
                event.event_type,
                event.order_id
            );
            return false;
        }
        partition.insert(event.order_id.clone(), event);
        true
    }

    pub fn ingest(&mut self, event: ClassifiedEvent) -> bool {
        self.add_event(event.into())
    }

    pub fn get(&self, event_type: CommerceEventType, order_id: &str) -> Option<&StoredCommerceEvent> {
        self.partitions.get(&event_type)?.get(order_id)
    }

    /// Clear the unread flag of one event. Returns `true` if it was unread.
    pub fn mark_as_read(&mut self, order_id: &str, event_type: CommerceEventType) -> bool {
        match self
            .partitions
            .get_mut(&event_type)
            .and_then(|p| p.get_mut(order_id))
        {
            Some(event) if event.unread => {
                event.unread = false;
                true
            }
            _ => false,
        }
    }

    /// Clear every unread flag for `order_id`. Returns how many flipped.
    pub fn mark_order_read(&mut self, order_id: &str) -> usize {
        CommerceEventType::ALL
            .into_iter()
            .filter(|t| self.mark_as_read(order_id, *t))
            .count()
    }

    pub fn set_processing_status(
        &mut self,
        order_id: &str,
        event_type: CommerceEventType,
        status: ProcessingStatus,
    ) -> bool {
        match self
            .partitions
            .get_mut(&event_type)
            .and_then(|p| p.get_mut(order_id))
        {
            Some(event) => {
                event.processing_status = status;
                true
            }
            None => false,
        }
    }

    pub fn select_order(&mut self, order_id: Option<String>) {
        self.selected_order = order_id;
    }

    pub fn selected_order(&self) -> Option<&str> {
        self.selected_order.as_deref()
    }

    /// Events of one partition, oldest first.
    pub fn partition(&self, event_type: CommerceEventType) -> Vec<&StoredCommerceEvent> {
        let mut events: Vec<_> = self
            .partitions
            .get(&event_type)
            .map(|p| p.values().collect())
            .unwrap_or_default();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        events
    }

    /// Every event for `order_id` across partitions, oldest first.
    pub fn events_for_order(&self, order_id: &str) -> Vec<&StoredCommerceEvent> {
        let mut events: Vec<_> = CommerceEventType::ALL
            .iter()
            .filter_map(|t| self.get(*t, order_id))
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });
        events
    }

    /// Every event in the store, unordered.
    pub fn all_events(&self) -> impl Iterator<Item = &StoredCommerceEvent> {
        self.partitions.values().flat_map(|p| p.values())
    }

    pub fn unread_counts(&self) -> UnreadCounts {
        let mut counts = UnreadCounts::default();
        for event in self.all_events().filter(|e| e.unread) {
            *counts.slot(event.event_type) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every event and the selection.
    pub fn clear(&mut self) {
        self.partitions.clear();
        self.selected_order = None;
    }

    pub fn snapshot(&self) -> PersistedOrders {
        let mut snapshot = PersistedOrders {
            selected_order: self.selected_order.clone(),
            ..Default::default()
        };
        for event_type in CommerceEventType::ALL {
            *snapshot.partition_mut(event_type) =
                self.partition(event_type).into_iter().cloned().collect();
        }
        snapshot
    }

    /// Rebuild a store from a snapshot. Entries are trusted as-is.
    pub fn restore(snapshot: PersistedOrders) -> Self {
        let mut store = Self {
            selected_order: snapshot.selected_order,
            ..Default::default()
        };
        let partitions = [
            snapshot.orders,
            snapshot.payment_requests,
            snapshot.status_updates,
            snapshot.shipping_updates,
            snapshot.payment_receipts,
        ];
        for event in partitions.into_iter().flatten() {
            store.add_event(event);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stored_event;

    #[test]
    fn first_write_wins() {
        let mut store = OrderStore::new();
        let first = stored_event(CommerceEventType::StatusUpdate, "o-1", 100);
        let mut second = stored_event(CommerceEventType::StatusUpdate, "o-1", 200);
        second.id = "other".to_string();

        assert!(store.add_event(first.clone()));
        assert!(!store.add_event(second));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(CommerceEventType::StatusUpdate, "o-1").unwrap().id,
            first.id
        );
    }

    #[test]
    fn same_order_id_in_different_partitions() {
        let mut store = OrderStore::new();
        assert!(store.add_event(stored_event(CommerceEventType::Order, "o-1", 100)));
        assert!(store.add_event(stored_event(CommerceEventType::PaymentRequest, "o-1", 150)));
        assert_eq!(store.events_for_order("o-1").len(), 2);
    }

    #[test]
    fn unread_accounting() {
        let mut store = OrderStore::new();
        store.add_event(stored_event(CommerceEventType::Order, "o-1", 100));
        store.add_event(stored_event(CommerceEventType::PaymentRequest, "o-1", 110));
        store.add_event(stored_event(CommerceEventType::PaymentRequest, "o-2", 120));

        let counts = store.unread_counts();
        assert_eq!(counts.orders, 1);
        assert_eq!(counts.payment_requests, 2);
        assert_eq!(counts.total(), 3);

        assert!(store.mark_as_read("o-1", CommerceEventType::PaymentRequest));
        assert!(!store.mark_as_read("o-1", CommerceEventType::PaymentRequest));
        assert!(!store.mark_as_read("missing", CommerceEventType::Order));

        let counts = store.unread_counts();
        assert_eq!(counts.payment_requests, 1);
        assert_eq!(counts.orders, 1);
        assert_eq!(counts.total(), 2);

        assert_eq!(store.mark_order_read("o-1"), 1);
        assert_eq!(store.unread_counts().total(), 1);
    }

    #[test]
    fn clear_drops_selection() {
        let mut store = OrderStore::new();
        store.add_event(stored_event(CommerceEventType::Order, "o-1", 100));
        store.select_order(Some("o-1".to_string()));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.selected_order(), None);
        assert_eq!(store.unread_counts().total(), 0);
    }

    #[test]
    fn processing_status_updates_in_place() {
        let mut store = OrderStore::new();
        store.add_event(stored_event(CommerceEventType::Order, "o-1", 100));
        assert!(store.set_processing_status(
            "o-1",
            CommerceEventType::Order,
            ProcessingStatus::Completed
        ));
        assert!(!store.set_processing_status(
            "o-2",
            CommerceEventType::Order,
            ProcessingStatus::Completed
        ));
        assert_eq!(
            store
                .get(CommerceEventType::Order, "o-1")
                .unwrap()
                .processing_status,
            ProcessingStatus::Completed
        );
    }

    #[test]
    fn snapshot_restores_verbatim() {
        let mut store = OrderStore::new();
        store.add_event(stored_event(CommerceEventType::Order, "o-1", 100));
        store.add_event(stored_event(CommerceEventType::ShippingUpdate, "o-1", 300));
        store.mark_as_read("o-1", CommerceEventType::Order);
        store.select_order(Some("o-1".to_string()));

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert!(json.contains("\"shippingUpdates\""));
        assert!(json.contains("\"selectedOrder\":\"o-1\""));

        let restored = OrderStore::restore(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.unread_counts().total(), 1);
    }

    #[test]
    fn missing_partitions_default_to_empty() {
        let snapshot: PersistedOrders = serde_json::from_str("{}").unwrap();
        assert!(OrderStore::restore(snapshot).is_empty());
    }
}
