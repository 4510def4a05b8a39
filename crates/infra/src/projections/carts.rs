use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_events::EventEnvelope;
use commerce_purchasing::{CART_AGGREGATE_TYPE, Cart, CartEvent, CartId, CartItem, CustomerId, OrderId};

use super::{Projection, ProjectionError, StreamFold};
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
    pub total_quantity: u32,
    pub converted: bool,
    pub converted_order_id: Option<OrderId>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            cart_id: cart.id_typed(),
            customer_id: cart.customer_id().clone(),
            items: cart.items().to_vec(),
            total_quantity: cart.total_quantity(),
            converted: cart.is_converted(),
            converted_order_id: cart.converted_order_id(),
            created_at: cart.created_at(),
            last_modified_at: cart.last_modified_at(),
        }
    }
}

pub struct CartsProjection {
    fold: StreamFold<Cart>,
    carts: Arc<dyn ReadStore<CartId, CartView>>,
}

impl CartsProjection {
    pub fn new(carts: Arc<dyn ReadStore<CartId, CartView>>) -> Self {
        Self {
            fold: StreamFold::new(CART_AGGREGATE_TYPE, |id| Cart::empty(CartId::new(id))),
            carts,
        }
    }

    pub fn get(&self, id: CartId) -> Option<CartView> {
        self.carts.get(&id)
    }

    /// Open (unconverted) carts of a customer, most recently touched first.
    pub fn open_for_customer(&self, customer_id: &CustomerId) -> Vec<CartView> {
        let mut carts: Vec<_> = self
            .carts
            .list()
            .into_iter()
            .filter(|c| &c.customer_id == customer_id && !c.converted)
            .collect();
        carts.sort_by(|a, b| b.last_modified_at.cmp(&a.last_modified_at));
        carts
    }
}

impl Projection for CartsProjection {
    fn name(&self) -> &'static str {
        "carts"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &[CART_AGGREGATE_TYPE]
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some((event, cart)) = self.fold.fold(envelope)? else {
            return Ok(());
        };

        match event {
            CartEvent::CartDeleted(e) => self.carts.remove(&e.cart_id),
            _ => self.carts.upsert(cart.id_typed(), CartView::from(&cart)),
        }
        Ok(())
    }

    fn reset(&self) {
        self.carts.clear();
        self.fold.clear();
    }
}
