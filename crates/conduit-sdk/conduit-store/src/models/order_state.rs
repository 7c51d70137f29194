use diesel::prelude::*;

use crate::schema::order_state;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = order_state)]
pub struct OrderStateRow {
    pub storage_key: String,
    pub payload: String,
    pub event_count: i32,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = order_state)]
pub struct NewOrderStateRow {
    pub storage_key: String,
    pub payload: String,
    pub event_count: i32,
}
