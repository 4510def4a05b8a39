use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use commerce_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockId(pub AggregateId);

impl StockId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Available,
    OutOfStock,
}

/// Aggregate root: Stock.
///
/// Invariant: `quantity >= 0`, and `status == OutOfStock` exactly when the
/// quantity is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stock {
    id: StockId,
    sku: String,
    quantity: i64,
    status: StockStatus,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Stock {
    pub fn empty(id: StockId) -> Self {
        Self {
            id,
            sku: String::new(),
            quantity: 0,
            status: StockStatus::OutOfStock,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn has_at_least(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}

impl AggregateRoot for Stock {
    type Id = StockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStock {
    pub stock_id: StockId,
    pub sku: String,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreaseStock {
    pub stock_id: StockId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecreaseStock {
    pub stock_id: StockId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkStockEmpty {
    pub stock_id: StockId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Register(RegisterStock),
    Increase(IncreaseStock),
    Decrease(DecreaseStock),
    MarkEmpty(MarkStockEmpty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRegistered {
    pub stock_id: StockId,
    pub sku: String,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// `quantity_after` lets consumers update without replaying history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIncreased {
    pub stock_id: StockId,
    pub quantity: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDecreased {
    pub stock_id: StockId,
    pub quantity: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEmptied {
    pub stock_id: StockId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum StockEvent {
    StockRegistered(StockRegistered),
    StockIncreased(StockIncreased),
    StockDecreased(StockDecreased),
    StockEmptied(StockEmptied),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockRegistered(_) => "stock.stock.registered",
            StockEvent::StockIncreased(_) => "stock.stock.increased",
            StockEvent::StockDecreased(_) => "stock.stock.decreased",
            StockEvent::StockEmptied(_) => "stock.stock.emptied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockRegistered(e) => e.occurred_at,
            StockEvent::StockIncreased(e) => e.occurred_at,
            StockEvent::StockDecreased(e) => e.occurred_at,
            StockEvent::StockEmptied(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Stock {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockRegistered(e) => {
                self.id = e.stock_id;
                self.sku = e.sku.clone();
                self.quantity = e.quantity;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            StockEvent::StockIncreased(e) => {
                self.quantity = e.quantity_after;
            }
            StockEvent::StockDecreased(e) => {
                self.quantity = e.quantity_after;
            }
            StockEvent::StockEmptied(_) => {
                self.quantity = 0;
            }
        }

        self.status = if self.quantity > 0 {
            StockStatus::Available
        } else {
            StockStatus::OutOfStock
        };
        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Register(cmd) => self.handle_register(cmd),
            StockCommand::Increase(cmd) => self.handle_increase(cmd),
            StockCommand::Decrease(cmd) => self.handle_decrease(cmd),
            StockCommand::MarkEmpty(cmd) => self.handle_mark_empty(cmd),
        }
    }
}

impl Stock {
    fn ensure_created(&self, stock_id: StockId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != stock_id {
            return Err(DomainError::invariant("stock_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterStock) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock already registered"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        ensure_positive(cmd.quantity)?;

        Ok(vec![StockEvent::StockRegistered(StockRegistered {
            stock_id: cmd.stock_id,
            sku: cmd.sku.trim().to_string(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_increase(&self, cmd: &IncreaseStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created(cmd.stock_id)?;
        ensure_positive(cmd.quantity)?;

        let quantity_after = self
            .quantity
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;

        Ok(vec![StockEvent::StockIncreased(StockIncreased {
            stock_id: cmd.stock_id,
            quantity: cmd.quantity,
            quantity_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decrease(&self, cmd: &DecreaseStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created(cmd.stock_id)?;
        ensure_positive(cmd.quantity)?;

        if cmd.quantity > self.quantity {
            return Err(DomainError::invariant(format!(
                "insufficient stock: requested {}, available {}",
                cmd.quantity, self.quantity
            )));
        }

        Ok(vec![StockEvent::StockDecreased(StockDecreased {
            stock_id: cmd.stock_id,
            quantity: cmd.quantity,
            quantity_after: self.quantity - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_empty(&self, cmd: &MarkStockEmpty) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created(cmd.stock_id)?;
        if self.quantity == 0 {
            return Err(DomainError::conflict("stock is already empty"));
        }

        Ok(vec![StockEvent::StockEmptied(StockEmptied {
            stock_id: cmd.stock_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(())
}
