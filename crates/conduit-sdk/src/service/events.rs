use crate::orders::StoredCommerceEvent;

/// Events emitted by the `OrderService` for the UI.
#[derive(Debug, Clone)]
pub enum OrderNotification {
    /// A new commerce message was stored.
    EventStored(StoredCommerceEvent),
    /// An order placed from this client was published.
    OrderPlaced { order_id: String },
    /// The active relay pool was replaced and the store cleared.
    RelaysChanged(Vec<String>),
    /// Every stored event was dropped (logout).
    Cleared,
}
