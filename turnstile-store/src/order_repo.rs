use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use turnstile_core::repository::{OrderRepository, TicketRepository};
use turnstile_core::{
    Attendee, BillingAddress, CodeGenerator, CommittedOrder, CoreResult, Order, OrderStatus, OrderStatusChange,
    PurchaseFilter, PurchasePage, PurgeSummary, SecureCodeGenerator, Ticket, TicketPurchase, TicketingError,
    WritePlan,
};
use turnstile_shared::{Currency, Masked};
use uuid::Uuid;

use crate::database::{map_sqlx_error, violation, DbClient, Violation};

const ORDER_COLUMNS: &str = "id, order_number, event_id, user_id, total_amount, currency, status, \
     payment_intent_id, payment_method, billing_name, billing_email, billing_address, refund_amount, \
     created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, order_id, ticket_type_id, event_id, user_id, line_index, quantity, \
     unit_price, total_price, currency, status, attendees, is_used, refund_reason, created_at, updated_at";

/// Shared WHERE clause for purchase listings; binds $1..$5 in
/// `PurchaseFilter` field order.
const PURCHASE_FILTER: &str = "($1::uuid IS NULL OR event_id = $1) \
     AND ($2::uuid IS NULL OR user_id = $2) \
     AND ($3::text IS NULL OR status = $3) \
     AND ($4::timestamptz IS NULL OR created_at >= $4) \
     AND ($5::timestamptz IS NULL OR created_at <= $5)";

const TICKET_COLUMNS: &str = "id, order_id, ticket_purchase_id, ticket_type_id, event_id, user_id, \
     ticket_number, qr_code, attendee_name, attendee_email, is_transferable, is_used, used_at, scanned_by, \
     created_at, updated_at";

/// Transactional writer plus order and ticket storage
pub struct PgOrderRepository {
    pool: PgPool,
    acquire_timeout: Duration,
    codes: Arc<dyn CodeGenerator>,
}

impl PgOrderRepository {
    pub fn new(db: &DbClient) -> Self {
        Self {
            pool: db.pool.clone(),
            acquire_timeout: db.acquire_timeout,
            codes: Arc::new(SecureCodeGenerator),
        }
    }

    fn db_error(&self, operation: &'static str, err: sqlx::Error) -> TicketingError {
        map_sqlx_error(operation, self.acquire_timeout, err)
    }

    fn write_error(&self, operation: &'static str, err: sqlx::Error) -> TicketingError {
        match violation(&err) {
            Some(Violation::Unique) => {
                tracing::error!(operation, error = %err, "Generated identifier collided with an existing one");
                TicketingError::Internal("identifier collision".to_string())
            }
            _ => self.db_error(operation, err),
        }
    }

    async fn insert_rows(&self, tx: &mut Transaction<'_, Postgres>, committed: &CommittedOrder) -> CoreResult<()> {
        let order = &committed.order;
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, event_id, user_id, total_amount, currency, status,
                payment_intent_id, payment_method, billing_name, billing_email, billing_address,
                refund_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.event_id)
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(order.currency.as_str())
        .bind(order.status.as_str())
        .bind(&order.payment_intent_id)
        .bind(&order.payment_method)
        .bind(&order.billing_name)
        .bind(order.billing_email.expose())
        .bind(order.billing_address.as_ref().map(Json))
        .bind(order.refund_amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| self.write_error("order insert", e))?;

        for purchase in &committed.purchases {
            sqlx::query(
                r#"
                INSERT INTO ticket_purchases (id, order_id, ticket_type_id, event_id, user_id, line_index,
                    quantity, unit_price, total_price, currency, status, attendees, is_used, refund_reason,
                    created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(purchase.id)
            .bind(purchase.order_id)
            .bind(purchase.ticket_type_id)
            .bind(purchase.event_id)
            .bind(purchase.user_id)
            .bind(purchase.line_index)
            .bind(purchase.quantity)
            .bind(purchase.unit_price)
            .bind(purchase.total_price)
            .bind(purchase.currency.as_str())
            .bind(purchase.status.as_str())
            .bind(Json(&purchase.attendees))
            .bind(purchase.is_used)
            .bind(&purchase.refund_reason)
            .bind(purchase.created_at)
            .bind(purchase.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| self.write_error("purchase insert", e))?;
        }

        for ticket in &committed.tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (id, order_id, ticket_purchase_id, ticket_type_id, event_id, user_id,
                    ticket_number, qr_code, attendee_name, attendee_email, is_transferable, is_used,
                    used_at, scanned_by, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(ticket.id)
            .bind(ticket.order_id)
            .bind(ticket.ticket_purchase_id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.event_id)
            .bind(ticket.user_id)
            .bind(&ticket.ticket_number)
            .bind(&ticket.qr_code)
            .bind(&ticket.attendee_name)
            .bind(ticket.attendee_email.expose())
            .bind(ticket.is_transferable)
            .bind(ticket.is_used)
            .bind(ticket.used_at)
            .bind(ticket.scanned_by)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| self.write_error("ticket insert", e))?;
        }

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    event_id: Uuid,
    user_id: Uuid,
    total_amount: Decimal,
    currency: String,
    status: String,
    payment_intent_id: Option<String>,
    payment_method: Option<String>,
    billing_name: String,
    billing_email: String,
    billing_address: Option<Json<BillingAddress>>,
    refund_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    order_id: Uuid,
    ticket_type_id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    line_index: i32,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    currency: String,
    status: String,
    attendees: Json<Vec<Attendee>>,
    is_used: bool,
    refund_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    ticket_purchase_id: Uuid,
    ticket_type_id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    ticket_number: String,
    qr_code: String,
    attendee_name: String,
    attendee_email: String,
    is_transferable: bool,
    is_used: bool,
    used_at: Option<DateTime<Utc>>,
    scanned_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(value: &str) -> CoreResult<OrderStatus> {
    OrderStatus::parse(value).ok_or_else(|| TicketingError::Internal(format!("unknown order status '{value}'")))
}

fn parse_currency(value: &str) -> CoreResult<Currency> {
    Currency::parse(value).map_err(|e| TicketingError::Internal(format!("stored currency: {e}")))
}

impl TryFrom<OrderRow> for Order {
    type Error = TicketingError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            event_id: row.event_id,
            user_id: row.user_id,
            total_amount: row.total_amount,
            currency: parse_currency(&row.currency)?,
            status: parse_status(&row.status)?,
            payment_intent_id: row.payment_intent_id,
            payment_method: row.payment_method,
            billing_name: row.billing_name,
            billing_email: Masked::new(row.billing_email),
            billing_address: row.billing_address.map(|Json(address)| address),
            refund_amount: row.refund_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<PurchaseRow> for TicketPurchase {
    type Error = TicketingError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        Ok(TicketPurchase {
            id: row.id,
            order_id: row.order_id,
            ticket_type_id: row.ticket_type_id,
            event_id: row.event_id,
            user_id: row.user_id,
            line_index: row.line_index,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            currency: parse_currency(&row.currency)?,
            status: parse_status(&row.status)?,
            attendees: row.attendees.0,
            is_used: row.is_used,
            refund_reason: row.refund_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            order_id: row.order_id,
            ticket_purchase_id: row.ticket_purchase_id,
            ticket_type_id: row.ticket_type_id,
            event_id: row.event_id,
            user_id: row.user_id,
            ticket_number: row.ticket_number,
            qr_code: row.qr_code,
            attendee_name: row.attendee_name,
            attendee_email: Masked::new(row.attendee_email),
            is_transferable: row.is_transferable,
            is_used: row.is_used,
            used_at: row.used_at,
            scanned_by: row.scanned_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn commit(&self, plan: &WritePlan) -> CoreResult<CommittedOrder> {
        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("checkout begin", e))?;

        for delta in plan.inventory() {
            let result = sqlx::query(
                r#"
                UPDATE ticket_types
                SET sold = sold + $2,
                    status = CASE WHEN quantity IS NOT NULL AND sold + $2 >= quantity THEN 'sold_out' ELSE status END,
                    updated_at = NOW()
                WHERE id = $1
                  AND status = 'active'
                  AND (quantity IS NULL OR sold + $2 <= quantity)
                "#,
            )
            .bind(delta.ticket_type_id)
            .bind(delta.quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.db_error("inventory decrement", e))?;

            if result.rows_affected() == 0 {
                return Err(TicketingError::InventoryRace {
                    ticket_type_id: delta.ticket_type_id,
                });
            }
        }

        let committed = plan.materialize(self.codes.as_ref(), Utc::now());
        self.insert_rows(&mut tx, &committed).await?;

        tx.commit().await.map_err(|e| self.db_error("checkout commit", e))?;
        Ok(committed)
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<CommittedOrder>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.db_error("order lookup", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let purchases: Vec<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM ticket_purchases WHERE order_id = $1 ORDER BY line_index"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.db_error("order purchases lookup", e))?;

        let tickets: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY ticket_number"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.db_error("order tickets lookup", e))?;

        Ok(Some(CommittedOrder {
            order: row.try_into()?,
            purchases: purchases
                .into_iter()
                .map(TicketPurchase::try_from)
                .collect::<CoreResult<_>>()?,
            tickets: tickets.into_iter().map(Ticket::from).collect(),
        }))
    }

    async fn list_purchases(&self, filter: &PurchaseFilter) -> CoreResult<PurchasePage> {
        let status = filter.status.map(|s| s.as_str());

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM ticket_purchases WHERE {PURCHASE_FILTER}"))
                .bind(filter.event_id)
                .bind(filter.user_id)
                .bind(status)
                .bind(filter.date_from)
                .bind(filter.date_to)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| self.db_error("purchase count", e))?;

        let rows: Vec<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {PURCHASE_COLUMNS} FROM ticket_purchases
            WHERE {PURCHASE_FILTER}
            ORDER BY created_at DESC, order_id, line_index
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(filter.event_id)
        .bind(filter.user_id)
        .bind(status)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(i64::from(filter.limit))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.db_error("purchase listing", e))?;

        let purchases = rows
            .into_iter()
            .map(TicketPurchase::try_from)
            .collect::<CoreResult<_>>()?;
        Ok(PurchasePage::new(purchases, total.max(0) as u64, filter))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> CoreResult<Order> {
        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("order status begin", e))?;

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE orders
            SET status = $3,
                payment_intent_id = COALESCE($4, payment_intent_id),
                payment_method = COALESCE($5, payment_method),
                refund_amount = COALESCE($6, refund_amount),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(change.status.as_str())
        .bind(&change.payment_intent_id)
        .bind(&change.payment_method)
        .bind(change.refund_amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| self.db_error("order status update", e))?;

        let Some(row) = row else {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| self.db_error("order lookup", e))?;
            return Err(match exists {
                Some(_) => TicketingError::StaleOrder(id),
                None => TicketingError::OrderNotFound(id),
            });
        };

        sqlx::query(
            r#"
            UPDATE ticket_purchases
            SET status = $2, refund_reason = COALESCE($3, refund_reason), updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(id)
        .bind(change.status.as_str())
        .bind(&change.refund_reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| self.db_error("purchase status update", e))?;

        tx.commit().await.map_err(|e| self.db_error("order status commit", e))?;
        row.try_into()
    }

    async fn purge_event(&self, event_id: Uuid) -> CoreResult<PurgeSummary> {
        let mut tx = self.pool.begin().await.map_err(|e| self.db_error("event purge begin", e))?;
        let mut summary = PurgeSummary::default();

        // Children first; foreign keys restrict deletes.
        for (table, count) in [
            ("tickets", &mut summary.tickets),
            ("ticket_purchases", &mut summary.purchases),
            ("orders", &mut summary.orders),
            ("ticket_types", &mut summary.ticket_types),
        ] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE event_id = $1"))
                .bind(event_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.db_error("event purge", e))?;
            *count = result.rows_affected();
        }

        tx.commit().await.map_err(|e| self.db_error("event purge commit", e))?;
        Ok(summary)
    }
}

#[async_trait]
impl TicketRepository for PgOrderRepository {
    async fn find_by_qr_code(&self, event_id: Uuid, qr_code: &str) -> CoreResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE qr_code = $1 AND event_id = $2"
        ))
        .bind(qr_code)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket lookup", e))?;
        Ok(row.map(Ticket::from))
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.db_error("ticket lookup", e))?;
        Ok(row.map(Ticket::from))
    }

    async fn mark_used(&self, ticket_id: Uuid, used_at: DateTime<Utc>, scanned_by: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET is_used = TRUE, used_at = $2, scanned_by = $3, updated_at = $2
            WHERE id = $1 AND is_used = FALSE
            "#,
        )
        .bind(ticket_id)
        .bind(used_at)
        .bind(scanned_by)
        .execute(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket scan", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_tickets_for_user(&self, user_id: Uuid, event_id: Option<Uuid>) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TICKET_COLUMNS} FROM tickets
            WHERE user_id = $1 AND ($2::uuid IS NULL OR event_id = $2)
            ORDER BY created_at, ticket_number
            "#
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket listing", e))?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn reassign_attendee(
        &self,
        ticket_id: Uuid,
        owner_id: Uuid,
        attendee_name: &str,
        attendee_email: &str,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET attendee_name = $3, attendee_email = $4, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND is_used = FALSE AND is_transferable = TRUE
            "#,
        )
        .bind(ticket_id)
        .bind(owner_id)
        .bind(attendee_name)
        .bind(attendee_email)
        .execute(&self.pool)
        .await
        .map_err(|e| self.db_error("ticket transfer", e))?;
        Ok(result.rows_affected() == 1)
    }
}
