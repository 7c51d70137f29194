pub mod commands;
pub mod identity;
pub mod state;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use conduit_sdk::nostr_sdk::Keys;
use conduit_sdk::{OrderNotification, OrderService, OrdersConfig};
use conduit_store::OrderStateStore;
use tokio::sync::{RwLock, broadcast};
use tracing_subscriber::EnvFilter;

use state::AppStateManager;

pub const ORDERS_DB_FILE: &str = "orders.sqlite";

/// Relay and transport crates that drown out app logs at `info`.
const QUIET_TARGETS: &[&str] = &[
    "nostr_relay_pool",
    "nostr_sdk",
    "tungstenite",
    "tokio_tungstenite",
    "rustls",
];

pub type Orders = OrderService<OrderStateStore>;

// ============================================================================
// Logging
// ============================================================================

/// Build the filter used by [`init_logging`]. `RUST_LOG` wins when set.
pub fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = level.to_string();
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{target}=warn"));
        }
        EnvFilter::new(directives)
    })
}

/// Install the fmt subscriber. `log` records from the SDK and store are
/// bridged into it. Calling this twice is harmless.
pub fn init_logging(level: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(log_filter(level))
        .with_target(true)
        .try_init()
    {
        eprintln!("logger already initialized: {e}");
    }
}

// ============================================================================
// App context
// ============================================================================

/// Everything the command layer needs: config, identity and the order
/// service bound to that identity.
pub struct ConduitApp {
    manager: Mutex<AppStateManager>,
    db: Arc<Mutex<OrderStateStore>>,
    keys: Mutex<Keys>,
    orders: RwLock<Arc<Orders>>,
    events: broadcast::Sender<OrderNotification>,
}

impl ConduitApp {
    /// Load config and identity from `app_data_dir`, open the order database
    /// and restore the saved order snapshot. Relays are not contacted until
    /// [`ConduitApp::start`]. Must be called inside a tokio runtime.
    pub fn open(app_data_dir: &Path) -> Result<Self, String> {
        let manager = AppStateManager::new(app_data_dir.to_path_buf());
        if manager.is_first_launch() {
            log::info!("first launch, writing default config");
            manager.save_config()?;
        }
        let keys = identity::load_or_generate_keys(app_data_dir)?;
        let db_path = db_path(app_data_dir);
        let db_path = db_path
            .to_str()
            .ok_or_else(|| "data dir is not valid UTF-8".to_string())?;
        let db = OrderStateStore::open(db_path).map_err(|e| format!("failed to open store: {e}"))?;
        let db = Arc::new(Mutex::new(db));

        let (events, _) = broadcast::channel(256);
        let orders = build_orders(&keys, &db, manager.relays(), &events);

        Ok(Self {
            manager: Mutex::new(manager),
            db,
            keys: Mutex::new(keys),
            orders: RwLock::new(orders),
            events,
        })
    }

    /// Connect to the relay pool and start listening for order messages.
    pub async fn start(&self) -> Result<(), String> {
        self.orders().await.start().await.map_err(|e| e.to_string())
    }

    pub async fn stop(&self) {
        self.orders().await.stop().await;
    }

    /// Order notifications, stable across identity changes.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderNotification> {
        self.events.subscribe()
    }

    pub async fn orders(&self) -> Arc<Orders> {
        self.orders.read().await.clone()
    }

    pub fn keys(&self) -> Result<Keys, String> {
        self.keys
            .lock()
            .map(|k| k.clone())
            .map_err(|_| "failed to lock nostr_keys".to_string())
    }

    pub fn with_manager<T>(
        &self,
        f: impl FnOnce(&mut AppStateManager) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut manager = self
            .manager
            .lock()
            .map_err(|_| "state lock failed".to_string())?;
        f(&mut manager)
    }

    pub fn app_data_dir(&self) -> Result<PathBuf, String> {
        self.with_manager(|m| Ok(m.app_data_dir().to_path_buf()))
    }

    /// Swap to `keys`: the current session is logged out, its stored orders
    /// dropped, and a fresh service started for the new identity.
    pub async fn replace_identity(&self, keys: Keys) -> Result<(), String> {
        let relays = self.with_manager(|m| Ok(m.relays().to_vec()))?;
        let mut orders = self.orders.write().await;
        orders.logout().await.map_err(|e| e.to_string())?;

        let fresh = build_orders(&keys, &self.db, &relays, &self.events);
        fresh.start().await.map_err(|e| e.to_string())?;
        *orders = fresh;
        *self
            .keys
            .lock()
            .map_err(|_| "failed to lock nostr_keys".to_string())? = keys;
        Ok(())
    }
}

fn db_path(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join(ORDERS_DB_FILE)
}

/// Build an order service and forward its notifications to `events`.
fn build_orders(
    keys: &Keys,
    db: &Arc<Mutex<OrderStateStore>>,
    relays: &[String],
    events: &broadcast::Sender<OrderNotification>,
) -> Arc<Orders> {
    let config = OrdersConfig {
        relays: relays.to_vec(),
        ..Default::default()
    };
    let (service, mut rx) = OrderService::with_persistence(keys.clone(), db.clone(), config);
    let events = events.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let _ = events.send(notification);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("order notification forwarder lagged by {n}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Arc::new(service)
}
