// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Public projection of a user, denormalized onto comments for display.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}
