pub mod order_state;

pub use order_state::{NewOrderStateRow, OrderStateRow};
