//! Per-order timelines with synthetic "waiting" markers.
//!
//! Timelines are recomputed on every read and never stored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::store::{OrderStore, StoredCommerceEvent};
use crate::commerce::CommerceEventType;
use crate::expiration::{ResolvedExpiration, expiration_of};

/// One row of an order's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimelineEntry {
    #[serde(rename_all = "camelCase")]
    Event {
        event: StoredCommerceEvent,
        /// Set on a payment request that lapsed before a receipt arrived.
        expired: bool,
    },
    /// The buyer has ordered and the merchant has not asked for payment yet.
    AwaitingMerchantResponse { timestamp: u64 },
    /// A live payment request is waiting for the buyer.
    AwaitingPayment {
        timestamp: u64,
        expiration: ResolvedExpiration,
    },
}

impl TimelineEntry {
    pub fn timestamp(&self) -> u64 {
        match self {
            TimelineEntry::Event { event, .. } => event.timestamp,
            TimelineEntry::AwaitingMerchantResponse { timestamp }
            | TimelineEntry::AwaitingPayment { timestamp, .. } => *timestamp,
        }
    }

    pub fn event(&self) -> Option<&StoredCommerceEvent> {
        match self {
            TimelineEntry::Event { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// All events for one order, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderGroup {
    pub order_id: String,
    pub latest_timestamp: u64,
    pub unread: usize,
    pub events: Vec<StoredCommerceEvent>,
}

fn last_index_of(events: &[&StoredCommerceEvent], event_type: CommerceEventType) -> Option<usize> {
    events.iter().rposition(|e| e.event_type == event_type)
}

/// Build the timeline of one order from its events, evaluated at `now`.
pub fn build_timeline(events: &[&StoredCommerceEvent], now: u64) -> Vec<TimelineEntry> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_type.cmp(&b.event_type))
    });

    let has_receipt = last_index_of(&sorted, CommerceEventType::PaymentReceipt).is_some();
    let last_order = last_index_of(&sorted, CommerceEventType::Order);
    let last_request = last_index_of(&sorted, CommerceEventType::PaymentRequest);

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(sorted.len() + 1);
    for (index, event) in sorted.iter().enumerate() {
        let mut expired = false;
        let mut marker = None;

        if Some(index) == last_order && last_request.is_none() {
            marker = Some(TimelineEntry::AwaitingMerchantResponse {
                timestamp: event.timestamp.saturating_add(1),
            });
        }

        if Some(index) == last_request && !has_receipt {
            let expiration = expiration_of(&event.raw_event, now);
            if expiration.is_expired {
                expired = true;
            } else {
                marker = Some(TimelineEntry::AwaitingPayment {
                    timestamp: event.timestamp.saturating_add(1),
                    expiration,
                });
            }
        }

        entries.push(TimelineEntry::Event {
            event: (*event).clone(),
            expired,
        });
        entries.extend(marker);
    }
    entries
}

impl OrderStore {
    /// Timeline for `order_id`, evaluated at `now`.
    pub fn timeline(&self, order_id: &str, now: u64) -> Vec<TimelineEntry> {
        build_timeline(&self.events_for_order(order_id), now)
    }

    /// Every order, most recently active first. Each group is newest first.
    pub fn grouped_orders(&self) -> Vec<OrderGroup> {
        let mut groups: HashMap<&str, Vec<&StoredCommerceEvent>> = HashMap::new();
        for event in self.all_events() {
            groups.entry(event.order_id.as_str()).or_default().push(event);
        }

        let mut grouped: Vec<OrderGroup> = groups
            .into_iter()
            .map(|(order_id, mut events)| {
                events.sort_by(|a, b| {
                    b.timestamp
                        .cmp(&a.timestamp)
                        .then_with(|| b.event_type.cmp(&a.event_type))
                });
                OrderGroup {
                    order_id: order_id.to_string(),
                    latest_timestamp: events.first().map_or(0, |e| e.timestamp),
                    unread: events.iter().filter(|e| e.unread).count(),
                    events: events.into_iter().cloned().collect(),
                }
            })
            .collect();

        grouped.sort_by(|a, b| {
            b.latest_timestamp
                .cmp(&a.latest_timestamp)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        grouped
    }
}
