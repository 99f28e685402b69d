use async_trait::async_trait;
use sqlx::PgPool;

use super::EventLookup;
use crate::{error::AppError, models::event::Event};

#[derive(Clone)]
pub struct PgEventLookup {
    pool: PgPool,
}

impl PgEventLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLookup for PgEventLookup {
    async fn find_event_by_id(&self, id: i64) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>("SELECT id, title FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }
}
