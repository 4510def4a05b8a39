use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_core::Money;
use commerce_events::EventEnvelope;
use commerce_purchasing::{
    CartId, CustomerId, ORDER_AGGREGATE_TYPE, Order, OrderId, OrderItem, OrderStatus, PaymentId,
};

use super::{Projection, ProjectionError, StreamFold};
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: OrderStatus,
    pub message: Option<String>,
    pub channel: String,
    pub source_cart_id: Option<CartId>,
    pub payment_id: Option<PaymentId>,
    pub failure_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id_typed(),
            customer_id: order.customer_id().clone(),
            items: order.items().to_vec(),
            total: order.total().clone(),
            status: order.status(),
            message: order.message().map(str::to_string),
            channel: order.channel().to_string(),
            source_cart_id: order.source_cart_id(),
            payment_id: order.payment_id().cloned(),
            failure_reason: order.failure_reason().map(str::to_string),
            created_at: order.created_at(),
            paid_at: order.paid_at(),
            completed_at: order.completed_at(),
        }
    }
}

pub struct OrdersProjection {
    fold: StreamFold<Order>,
    orders: Arc<dyn ReadStore<OrderId, OrderView>>,
}

impl OrdersProjection {
    pub fn new(orders: Arc<dyn ReadStore<OrderId, OrderView>>) -> Self {
        Self {
            fold: StreamFold::new(ORDER_AGGREGATE_TYPE, |id| Order::empty(OrderId::new(id))),
            orders,
        }
    }

    pub fn get(&self, id: OrderId) -> Option<OrderView> {
        self.orders.get(&id)
    }

    /// Order history of a customer, newest first.
    pub fn by_customer(&self, customer_id: &CustomerId) -> Vec<OrderView> {
        let mut orders: Vec<_> = self
            .orders
            .list()
            .into_iter()
            .filter(|o| &o.customer_id == customer_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.order_id.cmp(&a.order_id)));
        orders
    }
}

impl Projection for OrdersProjection {
    fn name(&self) -> &'static str {
        "orders"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &[ORDER_AGGREGATE_TYPE]
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if let Some((_, order)) = self.fold.fold(envelope)? {
            tracing::debug!(order_id = %order.id_typed(), status = order.status().as_str(), "order view updated");
            self.orders.upsert(order.id_typed(), OrderView::from(&order));
        }
        Ok(())
    }

    fn reset(&self) {
        self.orders.clear();
        self.fold.clear();
    }
}
