use std::time::Duration;

use super::{DEFAULT_RELAYS, ORDERS_STORAGE_KEY};

/// Configuration for the `OrderService`.
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// Nostr relay URLs forming the active pool.
    pub relays: Vec<String>,
    /// Timeout for relay-list lookups before publishing.
    pub fetch_timeout: Duration,
    /// Timeout for profile and product lookups.
    pub lookup_timeout: Duration,
    /// Key the order snapshot is persisted under.
    pub storage_key: String,
    /// Also wrap every outgoing message to the sender.
    pub copy_to_self: bool,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            fetch_timeout: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(4),
            storage_key: ORDERS_STORAGE_KEY.to_string(),
            copy_to_self: true,
        }
    }
}
