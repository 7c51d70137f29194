//! Buyer-side read model: the order store and the timelines derived from it.

pub(crate) mod persistence;
pub(crate) mod store;
pub(crate) mod timeline;

pub use persistence::{NoopPersistence, OrderPersistence};
pub use store::{
    OrderStore, PersistedOrders, ProcessingStatus, StoredCommerceEvent, UnreadCounts,
};
pub use timeline::{OrderGroup, TimelineEntry, build_timeline};
