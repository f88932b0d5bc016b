use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use turnstile_core::repository::EventDirectory;
use turnstile_core::{CoreResult, EventSummary};
use uuid::Uuid;

use crate::database::{map_sqlx_error, DbClient};

/// Read-only view over the platform's `events` table
pub struct PgEventDirectory {
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PgEventDirectory {
    pub fn new(db: &DbClient) -> Self {
        Self {
            pool: db.pool.clone(),
            acquire_timeout: db.acquire_timeout,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    organizer_id: Uuid,
    starts_at: DateTime<Utc>,
    capacity: Option<i32>,
}

#[async_trait]
impl EventDirectory for PgEventDirectory {
    async fn get_event(&self, id: Uuid) -> CoreResult<Option<EventSummary>> {
        let row: Option<EventRow> =
            sqlx::query_as("SELECT id, organizer_id, starts_at, capacity FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("event lookup", self.acquire_timeout, e))?;

        Ok(row.map(|r| EventSummary {
            id: r.id,
            organizer_id: r.organizer_id,
            starts_at: r.starts_at,
            capacity: r.capacity,
        }))
    }
}
