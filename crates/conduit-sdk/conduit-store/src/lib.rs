mod error;
mod models;
mod schema;
mod store;

pub use conduit_sdk::PersistedOrders;
pub use error::StoreError;
pub use store::{OrderStateInfo, OrderStateStore};

pub type Result<T> = std::result::Result<T, StoreError>;
