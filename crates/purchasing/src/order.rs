use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, Money};
use commerce_events::Event;
use commerce_products::ProductId;

use crate::cart::CartId;
use crate::common::{CustomerId, ProductOptions};

/// Refunds may be requested up to this many days after purchase confirmation.
pub const REFUND_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_CHANNEL: &str = "WEB";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reference issued by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::validation("payment_id cannot be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    PaymentFailed,
    Canceled,
    OutOfStock,
    Completed,
    RefundInProgress,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::OutOfStock => "OUT_OF_STOCK",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::RefundInProgress => "REFUND_IN_PROGRESS",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

/// Order line, priced at the time the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub options: ProductOptions,
}

impl OrderItem {
    pub fn subtotal(&self) -> Result<Money, DomainError> {
        self.unit_price.times(self.quantity)
    }
}

impl Entity for OrderItem {
    type Id = u32;

    fn id(&self) -> &Self::Id {
        &self.line_no
    }
}

/// Line requested by a caller; line numbers are assigned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub options: ProductOptions,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    total: Money,
    status: OrderStatus,
    message: Option<String>,
    channel: String,
    source_cart_id: Option<CartId>,
    payment_id: Option<PaymentId>,
    failure_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            customer_id: CustomerId::default(),
            items: Vec::new(),
            total: Money::krw(0),
            status: OrderStatus::Pending,
            message: None,
            channel: DEFAULT_CHANNEL.to_string(),
            source_cart_id: None,
            payment_id: None,
            failure_reason: None,
            created_at: None,
            paid_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> &Money {
        &self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn source_cart_id(&self) -> Option<CartId> {
        self.source_cart_id
    }

    pub fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Whether stock was taken for this order and has not been given back.
    pub fn holds_stock(&self) -> bool {
        matches!(self.status, OrderStatus::Paid | OrderStatus::Completed)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<NewOrderItem>,
    pub message: Option<String>,
    pub channel: Option<String>,
    pub source_cart_id: Option<CartId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPayment {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailPayment {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOutOfStock {
    pub order_id: OrderId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPurchase {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRefund {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRefund {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Create(CreateOrder),
    ConfirmPayment(ConfirmPayment),
    FailPayment(FailPayment),
    Cancel(CancelOrder),
    MarkOutOfStock(MarkOutOfStock),
    ConfirmPurchase(ConfirmPurchase),
    RequestRefund(RequestRefund),
    CompleteRefund(CompleteRefund),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub message: Option<String>,
    pub channel: String,
    pub source_cart_id: Option<CartId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub order_id: OrderId,
    pub previous_status: OrderStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMarkedOutOfStock {
    pub order_id: OrderId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseConfirmed {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequested {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefunded {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    PaymentConfirmed(PaymentConfirmed),
    PaymentFailed(PaymentFailed),
    OrderCanceled(OrderCanceled),
    OrderMarkedOutOfStock(OrderMarkedOutOfStock),
    PurchaseConfirmed(PurchaseConfirmed),
    RefundRequested(RefundRequested),
    OrderRefunded(OrderRefunded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "purchasing.order.created",
            OrderEvent::PaymentConfirmed(_) => "purchasing.order.payment_confirmed",
            OrderEvent::PaymentFailed(_) => "purchasing.order.payment_failed",
            OrderEvent::OrderCanceled(_) => "purchasing.order.canceled",
            OrderEvent::OrderMarkedOutOfStock(_) => "purchasing.order.out_of_stock",
            OrderEvent::PurchaseConfirmed(_) => "purchasing.order.purchase_confirmed",
            OrderEvent::RefundRequested(_) => "purchasing.order.refund_requested",
            OrderEvent::OrderRefunded(_) => "purchasing.order.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::PaymentConfirmed(e) => e.occurred_at,
            OrderEvent::PaymentFailed(e) => e.occurred_at,
            OrderEvent::OrderCanceled(e) => e.occurred_at,
            OrderEvent::OrderMarkedOutOfStock(e) => e.occurred_at,
            OrderEvent::PurchaseConfirmed(e) => e.occurred_at,
            OrderEvent::RefundRequested(e) => e.occurred_at,
            OrderEvent::OrderRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.customer_id = e.customer_id.clone();
                self.items = e.items.clone();
                self.total = e.total.clone();
                self.message = e.message.clone();
                self.channel = e.channel.clone();
                self.source_cart_id = e.source_cart_id;
                self.status = OrderStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::PaymentConfirmed(e) => {
                self.status = OrderStatus::Paid;
                self.payment_id = Some(e.payment_id.clone());
                self.paid_at = Some(e.occurred_at);
            }
            OrderEvent::PaymentFailed(e) => {
                self.status = OrderStatus::PaymentFailed;
                self.failure_reason = Some(e.reason.clone());
            }
            OrderEvent::OrderCanceled(e) => {
                self.status = OrderStatus::Canceled;
                self.failure_reason = e.reason.clone();
            }
            OrderEvent::OrderMarkedOutOfStock(e) => {
                self.status = OrderStatus::OutOfStock;
                self.failure_reason = Some(format!("out of stock: {}", e.sku));
            }
            OrderEvent::PurchaseConfirmed(e) => {
                self.status = OrderStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            OrderEvent::RefundRequested(e) => {
                self.status = OrderStatus::RefundInProgress;
                self.failure_reason = Some(e.reason.clone());
            }
            OrderEvent::OrderRefunded(_) => {
                self.status = OrderStatus::Refunded;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => self.handle_create(cmd),
            OrderCommand::ConfirmPayment(cmd) => self.handle_confirm_payment(cmd),
            OrderCommand::FailPayment(cmd) => self.handle_fail_payment(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkOutOfStock(cmd) => self.handle_mark_out_of_stock(cmd),
            OrderCommand::ConfirmPurchase(cmd) => self.handle_confirm_purchase(cmd),
            OrderCommand::RequestRefund(cmd) => self.handle_request_refund(cmd),
            OrderCommand::CompleteRefund(cmd) => self.handle_complete_refund(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[OrderStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "cannot {action} an order in status {}",
                self.status.as_str()
            )))
        }
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.customer_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("customer_id cannot be empty"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }

        let currency = cmd.items[0].unit_price.currency().to_string();
        let mut total = Money::zero(&currency);
        let mut items = Vec::with_capacity(cmd.items.len());

        for (idx, line) in cmd.items.iter().enumerate() {
            if line.name.trim().is_empty() {
                return Err(DomainError::validation("item name cannot be empty"));
            }
            if line.sku.trim().is_empty() {
                return Err(DomainError::validation("item sku cannot be empty"));
            }
            if line.quantity == 0 {
                return Err(DomainError::validation("item quantity must be at least 1"));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::validation("item unit price cannot be negative"));
            }

            let item = OrderItem {
                line_no: (idx + 1) as u32,
                product_id: line.product_id,
                sku: line.sku.clone(),
                name: line.name.clone(),
                unit_price: line.unit_price.clone(),
                quantity: line.quantity,
                options: line.options.clone(),
            };
            total = total.checked_add(&item.subtotal()?)?;
            items.push(item);
        }

        let channel = cmd
            .channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CHANNEL)
            .to_string();

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id.clone(),
            items,
            total,
            message: cmd.message.clone(),
            channel,
            source_cart_id: cmd.source_cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_payment(&self, cmd: &ConfirmPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Pending], "confirm payment for")?;

        Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmed {
            order_id: cmd.order_id,
            payment_id: cmd.payment_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail_payment(&self, cmd: &FailPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Pending], "fail payment for")?;

        Ok(vec![OrderEvent::PaymentFailed(PaymentFailed {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(
            &[OrderStatus::Paid, OrderStatus::Completed, OrderStatus::PaymentFailed],
            "cancel",
        )?;

        Ok(vec![OrderEvent::OrderCanceled(OrderCanceled {
            order_id: cmd.order_id,
            previous_status: self.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_out_of_stock(&self, cmd: &MarkOutOfStock) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Pending, OrderStatus::Paid], "mark out of stock")?;

        Ok(vec![OrderEvent::OrderMarkedOutOfStock(OrderMarkedOutOfStock {
            order_id: cmd.order_id,
            sku: cmd.sku.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm_purchase(&self, cmd: &ConfirmPurchase) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Paid], "confirm purchase of")?;

        Ok(vec![OrderEvent::PurchaseConfirmed(PurchaseConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request_refund(&self, cmd: &RequestRefund) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::Completed], "request a refund for")?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("refund reason cannot be empty"));
        }
        let completed_at = self
            .completed_at
            .ok_or_else(|| DomainError::invariant("completed order has no completion time"))?;
        if cmd.occurred_at > completed_at + Duration::days(REFUND_WINDOW_DAYS) {
            return Err(DomainError::invariant(format!(
                "refund window of {REFUND_WINDOW_DAYS} days has passed"
            )));
        }

        Ok(vec![OrderEvent::RefundRequested(RefundRequested {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete_refund(&self, cmd: &CompleteRefund) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(&[OrderStatus::RefundInProgress], "refund")?;

        Ok(vec![OrderEvent::OrderRefunded(OrderRefunded {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
