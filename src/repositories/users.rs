use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use super::ProfileLookup;
use crate::{error::AppError, models::user::AuthorProfile};

#[derive(Clone)]
pub struct PgProfileLookup {
    pool: PgPool,
}

impl PgProfileLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileLookup for PgProfileLookup {
    async fn profiles(&self, user_ids: &[i64]) -> Result<HashMap<i64, AuthorProfile>, AppError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, AuthorProfile>(
            r#"
            SELECT id, username, first_name, last_name, avatar_url
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }
}
