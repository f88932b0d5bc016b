use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use turnstile_core::TicketingError;

use crate::app_config::DatabaseConfig;

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
    pub acquire_timeout: Duration,
}

impl DbClient {
    pub async fn new(settings: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let acquire_timeout = Duration::from_secs(settings.acquire_timeout_secs);
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(&settings.url)
            .await?;

        Ok(Self { pool, acquire_timeout })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Constraint that rejected a write, if any.
pub(crate) enum Violation {
    ForeignKey,
    Unique,
}

pub(crate) fn violation(err: &sqlx::Error) -> Option<Violation> {
    let db_err = err.as_database_error()?;
    match db_err.code().as_deref() {
        Some(FOREIGN_KEY_VIOLATION) => Some(Violation::ForeignKey),
        Some(UNIQUE_VIOLATION) => Some(Violation::Unique),
        _ => None,
    }
}

/// Translate a driver error that has no business meaning at the call site.
/// Pool exhaustion is a timeout; everything else is logged and opaque.
pub(crate) fn map_sqlx_error(operation: &'static str, acquire_timeout: Duration, err: sqlx::Error) -> TicketingError {
    match err {
        sqlx::Error::PoolTimedOut => {
            tracing::warn!(operation, "Timed out waiting for a database connection");
            TicketingError::Timeout {
                operation,
                elapsed: acquire_timeout,
            }
        }
        other => {
            tracing::error!(operation, error = %other, "Database error");
            TicketingError::Internal(format!("{operation} failed"))
        }
    }
}
