use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use turnstile_core::repository::OrderRepository;
use turnstile_core::{
    CommittedOrder, CoreResult, Order, OrderStatus, OrderStatusChange, PurchaseFilter, PurchasePage, PurgeSummary,
    TicketingError,
};
use turnstile_shared::money;
use uuid::Uuid;

use crate::deadline::bounded;

/// Longest refund reason kept on purchase lines
pub const MAX_REFUND_REASON_LEN: usize = 500;

/// Order lifecycle after checkout.
///
/// Status changes come from outside (payment confirmation, refunds) and
/// follow `pending -> completed | failed` and `completed -> refunded`.
/// Inventory is not returned on failure or refund.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    timeout: Duration,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>, timeout: Duration) -> Self {
        Self { orders, timeout }
    }

    pub async fn get_order(&self, order_id: Uuid) -> CoreResult<CommittedOrder> {
        bounded("order lookup", self.timeout, self.orders.get_order(order_id))
            .await?
            .ok_or(TicketingError::OrderNotFound(order_id))
    }

    /// Like `get_order`, but orders of other users are reported as missing.
    pub async fn get_order_for_user(&self, order_id: Uuid, user_id: Uuid) -> CoreResult<CommittedOrder> {
        let committed = self.get_order(order_id).await?;
        if committed.order.user_id != user_id {
            return Err(TicketingError::OrderNotFound(order_id));
        }
        Ok(committed)
    }

    pub async fn update_status(&self, order_id: Uuid, mut change: OrderStatusChange) -> CoreResult<Order> {
        let current = self.get_order(order_id).await?.order;

        if !current.status.can_transition_to(change.status) {
            return Err(TicketingError::Validation(format!(
                "Invalid state transition from {} to {}",
                current.status.as_str(),
                change.status.as_str()
            )));
        }

        if change.status == OrderStatus::Refunded {
            let refund = change.refund_amount.unwrap_or(current.total_amount);
            change.refund_amount = Some(check_refund(refund, current.total_amount)?);
            change.refund_reason = check_refund_reason(change.refund_reason.take())?;
        } else if change.refund_amount.is_some() || change.refund_reason.is_some() {
            return Err(TicketingError::Validation(
                "Refund details are only accepted when refunding".to_string(),
            ));
        }

        let updated = bounded(
            "order status update",
            self.timeout,
            self.orders.update_order_status(order_id, current.status, &change),
        )
        .await?;

        tracing::info!(
            order_id = %order_id,
            from = current.status.as_str(),
            to = updated.status.as_str(),
            "Order status changed"
        );
        Ok(updated)
    }

    /// Paginated purchase lines, newest first.
    pub async fn list_purchases(&self, filter: &PurchaseFilter) -> CoreResult<PurchasePage> {
        filter.validate()?;
        bounded("purchase listing", self.timeout, self.orders.list_purchases(filter)).await
    }

    /// Remove every ticketing row of an event. Used when the event itself
    /// is deleted.
    pub async fn purge_event(&self, event_id: Uuid) -> CoreResult<PurgeSummary> {
        let summary = bounded("event purge", self.timeout, self.orders.purge_event(event_id)).await?;
        tracing::info!(
            event_id = %event_id,
            ticket_types = summary.ticket_types,
            orders = summary.orders,
            tickets = summary.tickets,
            "Event ticketing data purged"
        );
        Ok(summary)
    }
}

fn check_refund(refund: Decimal, total: Decimal) -> CoreResult<Decimal> {
    let refund = money::validate_price(refund).map_err(|e| TicketingError::Validation(e.to_string()))?;
    if refund > total {
        return Err(TicketingError::Validation(format!(
            "Refund {} exceeds order total {}",
            refund, total
        )));
    }
    Ok(refund)
}

fn check_refund_reason(reason: Option<String>) -> CoreResult<Option<String>> {
    let Some(reason) = reason else {
        return Ok(None);
    };
    let reason = reason.trim();
    if reason.chars().count() > MAX_REFUND_REASON_LEN {
        return Err(TicketingError::Validation(format!(
            "Refund reason must be at most {MAX_REFUND_REASON_LEN} characters"
        )));
    }
    Ok((!reason.is_empty()).then(|| reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{PurchaseLine, PurchaseRequest};
    use crate::checkout::CheckoutService;
    use crate::test_support::{attendees, billing, store_with_event, ticket_type};
    use turnstile_core::repository::{TicketRepository, TicketTypeRepository};
    use turnstile_core::ErrorKind;

    async fn placed_order() -> (OrderService, CommittedOrder, Arc<turnstile_store::memory::InMemoryStore>) {
        let (store, event_id) = store_with_event().await;
        let tt = ticket_type(event_id, "20.00", Some(10));
        store.insert_ticket_type(&tt).await.unwrap();

        let checkout = CheckoutService::new(store.clone(), store.clone(), store.clone(), Duration::from_secs(5));
        let committed = checkout
            .purchase(PurchaseRequest {
                event_id,
                user_id: Uuid::new_v4(),
                lines: vec![PurchaseLine {
                    ticket_type_id: tt.id,
                    quantity: 2,
                    attendees: attendees(2),
                }],
                billing: billing(),
            })
            .await
            .unwrap();

        (OrderService::new(store.clone(), Duration::from_secs(5)), committed, store)
    }

    fn change(status: OrderStatus) -> OrderStatusChange {
        OrderStatusChange {
            status,
            payment_intent_id: None,
            payment_method: None,
            refund_amount: None,
            refund_reason: None,
        }
    }

    #[tokio::test]
    async fn test_get_order_returns_children() {
        let (service, committed, _) = placed_order().await;
        let fetched = service.get_order(committed.order.id).await.unwrap();
        assert_eq!(fetched.order.order_number, committed.order.order_number);
        assert_eq!(fetched.tickets.len(), 2);

        let err = service.get_order(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_an_order() {
        let (service, committed, _) = placed_order().await;
        let err = service
            .get_order_for_user(committed.order.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::OrderNotFound(_)));
        assert!(service
            .get_order_for_user(committed.order.id, committed.order.user_id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_completion_then_full_refund() {
        let (service, committed, _) = placed_order().await;
        let id = committed.order.id;

        let mut paid = change(OrderStatus::Completed);
        paid.payment_intent_id = Some("pi_paid".to_string());
        let order = service.update_status(id, paid).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_intent_id.as_deref(), Some("pi_paid"));

        let order = service.update_status(id, change(OrderStatus::Refunded)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(order.refund_amount, Some(committed.order.total_amount));
    }

    #[tokio::test]
    async fn test_refund_is_bounded_by_total() {
        let (service, committed, _) = placed_order().await;
        let id = committed.order.id;
        service.update_status(id, change(OrderStatus::Completed)).await.unwrap();

        let mut too_much = change(OrderStatus::Refunded);
        too_much.refund_amount = Some("40.01".parse().unwrap());
        assert!(matches!(
            service.update_status(id, too_much).await,
            Err(TicketingError::Validation(_))
        ));

        let mut partial = change(OrderStatus::Refunded);
        partial.refund_amount = Some("15.00".parse().unwrap());
        let order = service.update_status(id, partial).await.unwrap();
        assert_eq!(order.refund_amount, Some("15.00".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let (service, committed, _) = placed_order().await;
        let id = committed.order.id;

        let err = service.update_status(id, change(OrderStatus::Refunded)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        service.update_status(id, change(OrderStatus::Failed)).await.unwrap();
        let err = service.update_status(id, change(OrderStatus::Completed)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_failed_order_keeps_inventory_and_tickets() {
        let (service, committed, store) = placed_order().await;
        service
            .update_status(committed.order.id, change(OrderStatus::Failed))
            .await
            .unwrap();

        let tt = store
            .get_ticket_type(committed.purchases[0].ticket_type_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tt.sold, 2);
        let tickets = store.list_tickets_for_user(committed.order.user_id, None).await.unwrap();
        assert_eq!(tickets.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_event_removes_everything() {
        let (service, committed, store) = placed_order().await;
        let summary = service.purge_event(committed.order.event_id).await.unwrap();
        assert_eq!(summary.ticket_types, 1);
        assert_eq!(summary.orders, 1);
        assert_eq!(summary.purchases, 1);
        assert_eq!(summary.tickets, 2);

        assert!(store.get_order(committed.order.id).await.unwrap().is_none());
        assert!(store
            .list_ticket_types(committed.order.event_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_refund_reason_is_recorded_on_lines() {
        let (service, committed, _) = placed_order().await;
        let id = committed.order.id;
        service.update_status(id, change(OrderStatus::Completed)).await.unwrap();

        let mut refund = change(OrderStatus::Refunded);
        refund.refund_reason = Some(" Show cancelled ".to_string());
        service.update_status(id, refund).await.unwrap();

        let fetched = service.get_order(id).await.unwrap();
        assert_eq!(fetched.purchases[0].refund_reason.as_deref(), Some("Show cancelled"));
    }

    #[tokio::test]
    async fn test_refund_reason_rules() {
        let (service, committed, _) = placed_order().await;
        let id = committed.order.id;

        let mut early = change(OrderStatus::Completed);
        early.refund_reason = Some("Not yet".to_string());
        let err = service.update_status(id, early).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        service.update_status(id, change(OrderStatus::Completed)).await.unwrap();
        let mut long = change(OrderStatus::Refunded);
        long.refund_reason = Some("x".repeat(MAX_REFUND_REASON_LEN + 1));
        let err = service.update_status(id, long).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let order = service.get_order(id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_purchases_validates_paging() {
        let (service, committed, _) = placed_order().await;

        let page = service
            .list_purchases(&PurchaseFilter {
                user_id: Some(committed.order.user_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.purchases[0].order_id, committed.order.id);

        let err = service
            .list_purchases(&PurchaseFilter {
                limit: 101,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
