use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use conduit_sdk::PersistedOrders;

use crate::error::StoreError;
use crate::models::{NewOrderStateRow, OrderStateRow};
use crate::schema::order_state;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQL expression for SQLite's `datetime('now')`.
const DATETIME_NOW: &str = "datetime('now')";

/// Format SQLite uses for `datetime('now')`.
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Bookkeeping about a saved snapshot, without decoding its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStateInfo {
    pub storage_key: String,
    pub event_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderStateRow> for OrderStateInfo {
    type Error = StoreError;

    fn try_from(row: OrderStateRow) -> crate::Result<Self> {
        let updated_at = NaiveDateTime::parse_from_str(&row.updated_at, SQLITE_DATETIME)
            .map_err(|e| StoreError::InvalidData(format!("bad updated_at {}: {e}", row.updated_at)))?
            .and_utc();
        let event_count = usize::try_from(row.event_count)
            .map_err(|_| StoreError::InvalidData(format!("negative event count for {}", row.storage_key)))?;
        Ok(OrderStateInfo {
            storage_key: row.storage_key,
            event_count,
            updated_at,
        })
    }
}

/// SQLite-backed snapshot storage for the order store.
///
/// One row per storage key; the payload is the JSON form of
/// [`PersistedOrders`], so the schema does not follow changes to the event
/// details.
pub struct OrderStateStore {
    conn: SqliteConnection,
}

impl OrderStateStore {
    /// Open (or create) a store at `path` and run pending migrations.
    pub fn open(path: &str) -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(path)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(OrderStateStore { conn })
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::open(":memory:")
    }

    /// Decode the snapshot saved under `key`, if any.
    pub fn load(&mut self, key: &str) -> crate::Result<Option<PersistedOrders>> {
        let payload: Option<String> = order_state::table
            .filter(order_state::storage_key.eq(key))
            .select(order_state::payload)
            .first(&mut self.conn)
            .optional()?;
        payload
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Insert or overwrite the snapshot under `key`.
    pub fn save(&mut self, key: &str, snapshot: &PersistedOrders) -> crate::Result<()> {
        let event_count = i32::try_from(snapshot.event_count())
            .map_err(|_| StoreError::InvalidData("too many events in snapshot".to_string()))?;
        let row = NewOrderStateRow {
            storage_key: key.to_string(),
            payload: serde_json::to_string(snapshot)?,
            event_count,
        };
        diesel::insert_into(order_state::table)
            .values(&row)
            .on_conflict(order_state::storage_key)
            .do_update()
            .set((
                order_state::payload.eq(&row.payload),
                order_state::event_count.eq(row.event_count),
                order_state::updated_at.eq(diesel::dsl::sql::<Text>(DATETIME_NOW)),
            ))
            .execute(&mut self.conn)?;
        log::debug!("saved {} order events under {key}", row.event_count);
        Ok(())
    }

    /// Remove the snapshot under `key`. Returns whether a row existed.
    pub fn delete(&mut self, key: &str) -> crate::Result<bool> {
        let removed = diesel::delete(order_state::table.filter(order_state::storage_key.eq(key)))
            .execute(&mut self.conn)?;
        Ok(removed > 0)
    }

    /// Size and save time of the snapshot under `key`.
    pub fn info(&mut self, key: &str) -> crate::Result<Option<OrderStateInfo>> {
        order_state::table
            .filter(order_state::storage_key.eq(key))
            .select(OrderStateRow::as_select())
            .first(&mut self.conn)
            .optional()?
            .map(OrderStateInfo::try_from)
            .transpose()
    }

    /// Every storage key with a saved snapshot.
    pub fn keys(&mut self) -> crate::Result<Vec<String>> {
        Ok(order_state::table
            .select(order_state::storage_key)
            .order(order_state::storage_key.asc())
            .load(&mut self.conn)?)
    }
}

// ---------------------------------------------------------------------------
// OrderPersistence impl
// ---------------------------------------------------------------------------

impl conduit_sdk::OrderPersistence for OrderStateStore {
    fn load(&mut self, key: &str) -> Result<Option<PersistedOrders>, String> {
        OrderStateStore::load(self, key).map_err(|e| format!("{e}"))
    }

    fn save(&mut self, key: &str, snapshot: &PersistedOrders) -> Result<(), String> {
        OrderStateStore::save(self, key, snapshot).map_err(|e| format!("{e}"))
    }

    fn delete(&mut self, key: &str) -> Result<(), String> {
        OrderStateStore::delete(self, key)
            .map(|_| ())
            .map_err(|e| format!("{e}"))
    }
}
