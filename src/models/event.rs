use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The slice of an event record the comment subsystem needs.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
}
