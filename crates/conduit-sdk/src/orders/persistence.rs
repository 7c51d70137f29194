use super::store::PersistedOrders;

/// Durable backing for the order store snapshot.
///
/// Lives in the SDK so `conduit-store` can implement it without the SDK
/// depending on diesel. Errors cross the boundary as strings.
pub trait OrderPersistence: Send + 'static {
    /// Load the snapshot saved under `key`, if any.
    fn load(&mut self, key: &str) -> Result<Option<PersistedOrders>, String>;

    /// Replace the snapshot saved under `key`.
    fn save(&mut self, key: &str, orders: &PersistedOrders) -> Result<(), String>;

    /// Remove the snapshot saved under `key`. Missing keys are not an error.
    fn delete(&mut self, key: &str) -> Result<(), String>;
}

/// Persistence that keeps nothing.
pub struct NoopPersistence;

impl OrderPersistence for NoopPersistence {
    fn load(&mut self, _key: &str) -> Result<Option<PersistedOrders>, String> {
        Ok(None)
    }

    fn save(&mut self, _key: &str, _orders: &PersistedOrders) -> Result<(), String> {
        Ok(())
    }

    fn delete(&mut self, _key: &str) -> Result<(), String> {
        Ok(())
    }
}
