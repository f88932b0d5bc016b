use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use turnstile_catalog::{TicketType, TicketTypeStatus};
use turnstile_core::repository::TicketTypeRepository;
use turnstile_core::{CoreResult, TicketingError};
use turnstile_shared::Currency;
use uuid::Uuid;

use crate::database::{map_sqlx_error, violation, DbClient, Violation};

const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, description, price, currency, quantity, sold, \
     max_per_purchase, sale_start, sale_end, refund_deadline, is_refundable, sort_order, status, \
     created_at, updated_at";

pub struct PgTicketTypeRepository {
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PgTicketTypeRepository {
    pub fn new(db: &DbClient) -> Self {
        Self {
            pool: db.pool.clone(),
            acquire_timeout: db.acquire_timeout,
        }
    }

    fn db_error(&self, operation: &'static str, err: sqlx::Error) -> TicketingError {
        map_sqlx_error(operation, self.acquire_timeout, err)
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketTypeRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    description: Option<String>,
    price: Decimal,
    currency: String,
    quantity: Option<i32>,
    sold: i32,
    max_per_purchase: Option<i32>,
    sale_start: Option<DateTime<Utc>>,
    sale_end: Option<DateTime<Utc>>,
    refund_deadline: Option<DateTime<Utc>>,
    is_refundable: bool,
    sort_order: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketTypeRow> for TicketType {
    type Error = TicketingError;

    fn try_from(row: TicketTypeRow) -> Result<Self, Self::Error> {
        let status = TicketTypeStatus::parse(&row.status)
            .ok_or_else(|| TicketingError::Internal(format!("unknown ticket type status '{}'", row.status)))?;
        let currency = Currency::parse(&row.currency)
            .map_err(|e| TicketingError::Internal(format!("stored ticket type {}: {}", row.id, e)))?;

        Ok(TicketType {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            description: row.description,
            price: row.price,
            currency,
            quantity: row.quantity,
            sold: row.sold,
            max_per_purchase: row.max_per_purchase,
            sale_start: row.sale_start,
            sale_end: row.sale_end,
            refund_deadline: row.refund_deadline,
            is_refundable: row.is_refundable,
            sort_order: row.sort_order,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TicketTypeRepository for PgTicketTypeRepository {
    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ticket_types (id, event_id, name, description, price, currency, quantity, sold,
                max_per_purchase, sale_start, sale_end, refund_deadline, is_refundable, sort_order, status,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(ticket_type.id)
        .bind(ticket_type.event_id)
        .bind(&ticket_type.name)
        .bind(&ticket_type.description)
        .bind(ticket_type.price)
        .bind(ticket_type.currency.as_str())
        .bind(ticket_type.quantity)
        .bind(ticket_type.sold)
        .bind(ticket_type.max_per_purchase)
        .bind(ticket_type.sale_start)
        .bind(ticket_type.sale_end)
        .bind(ticket_type.refund_deadline)
        .bind(ticket_type.is_refundable)
        .bind(ticket_type.sort_order)
        .bind(ticket_type.status.as_str())
        .bind(ticket_type.created_at)
        .bind(ticket_type.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            Some(Violation::ForeignKey) => TicketingError::EventNotFound(ticket_type.event_id),
            _ => self.db_error("ticket type insert", e),
        })?;
        Ok(())
    }

    async fn get_ticket_type(&self, id: Uuid) -> CoreResult<Option<TicketType>> {
        let row: Option<TicketTypeRow> =
            sqlx::query_as(&format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| self.db_error("ticket type lookup", e))?;
        row.map(TicketType::try_from).transpose()
    }

    async fn get_ticket_types(&self, ids: &[Uuid]) -> CoreResult<Vec<TicketType>> {
        let rows: Vec<TicketTypeRow> =
            sqlx::query_as(&format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| self.db_error("inventory snapshot", e))?;
        rows.into_iter().map(TicketType::try_from).collect()
    }

    async fn list_ticket_types(&self, event_id: Uuid) -> CoreResult<Vec<TicketType>> {
        let rows: Vec<TicketTypeRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE event_id = $1 ORDER BY sort_order, created_at"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket type listing", e))?;
        rows.into_iter().map(TicketType::try_from).collect()
    }

    async fn update_ticket_type(&self, ticket_type: &TicketType, expected_sold: i32) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ticket_types
            SET name = $2, description = $3, price = $4, currency = $5, quantity = $6,
                max_per_purchase = $7, sale_start = $8, sale_end = $9, refund_deadline = $10,
                is_refundable = $11, sort_order = $12, status = $13, updated_at = $14
            WHERE id = $1 AND sold = $15
            "#,
        )
        .bind(ticket_type.id)
        .bind(&ticket_type.name)
        .bind(&ticket_type.description)
        .bind(ticket_type.price)
        .bind(ticket_type.currency.as_str())
        .bind(ticket_type.quantity)
        .bind(ticket_type.max_per_purchase)
        .bind(ticket_type.sale_start)
        .bind(ticket_type.sale_end)
        .bind(ticket_type.refund_deadline)
        .bind(ticket_type.is_refundable)
        .bind(ticket_type.sort_order)
        .bind(ticket_type.status.as_str())
        .bind(ticket_type.updated_at)
        .bind(expected_sold)
        .execute(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket type update", e))?;

        if result.rows_affected() == 0 {
            return match self.get_ticket_type(ticket_type.id).await? {
                Some(_) => Err(TicketingError::InventoryRace {
                    ticket_type_id: ticket_type.id,
                }),
                None => Err(TicketingError::TicketTypeNotFound(ticket_type.id)),
            };
        }
        Ok(())
    }

    async fn delete_ticket_type(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM ticket_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match violation(&e) {
                Some(Violation::ForeignKey) => {
                    TicketingError::Validation("Ticket type has purchases and cannot be deleted".to_string())
                }
                _ => self.db_error("ticket type delete", e),
            })?;

        if result.rows_affected() == 0 {
            return Err(TicketingError::TicketTypeNotFound(id));
        }
        Ok(())
    }
}
