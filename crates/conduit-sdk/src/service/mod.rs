pub(crate) mod config;
pub(crate) mod events;
pub(crate) mod relays;
pub(crate) mod service;

/// Relays used when the user has not configured any.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.primal.net",
    "wss://nos.lol",
];

/// Key the order snapshot is persisted under.
pub const ORDERS_STORAGE_KEY: &str = "conduit-market:orders";

pub use config::OrdersConfig;
pub use events::OrderNotification;
pub use relays::{build_relay_list_filter, parse_relay_list, select_publish_relays};
pub use service::OrderService;
