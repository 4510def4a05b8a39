use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity};
use commerce_events::Event;
use commerce_products::ProductId;

use crate::common::{CustomerId, ProductOptions};
use crate::order::OrderId;

/// Distinct items a cart may hold.
pub const MAX_ITEM_TYPES: usize = 50;
pub const MIN_ITEM_QUANTITY: u32 = 1;
pub const MAX_ITEM_QUANTITY: u32 = 99;
/// Days without modification after which a cart counts as expired.
pub const CART_EXPIRY_DAYS: i64 = 90;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub AggregateId);

impl CartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(pub AggregateId);

impl CartItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CartItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client-facing cart error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartErrorCode {
    AlreadyConverted,
    ItemLimitExceeded,
    InvalidState,
    InvalidQuantity,
    RequiredOptionMissing,
    InsufficientStock,
}

impl CartErrorCode {
    pub fn code(self) -> &'static str {
        match self {
            CartErrorCode::AlreadyConverted => "CART_001",
            CartErrorCode::ItemLimitExceeded => "CART_002",
            CartErrorCode::InvalidState => "CART_003",
            CartErrorCode::InvalidQuantity => "CART_004",
            CartErrorCode::RequiredOptionMissing => "CART_005",
            CartErrorCode::InsufficientStock => "CART_006",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            CartErrorCode::AlreadyConverted => "Cart is already converted to order",
            CartErrorCode::ItemLimitExceeded => "Cart item limit exceeded",
            CartErrorCode::InvalidState => "Invalid cart state",
            CartErrorCode::InvalidQuantity => "Invalid quantity",
            CartErrorCode::RequiredOptionMissing => "Required option is missing",
            CartErrorCode::InsufficientStock => "Insufficient stock",
        }
    }

    pub fn error(self) -> DomainError {
        DomainError::rule(self.code(), self.default_message())
    }

    pub fn with_detail(self, detail: impl core::fmt::Display) -> DomainError {
        DomainError::rule(self.code(), format!("{}: {detail}", self.default_message()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub sku: String,
    pub options: ProductOptions,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub available: bool,
    pub unavailable_reason: Option<String>,
}

impl CartItem {
    pub fn is_same_product(&self, product_id: ProductId, options: &ProductOptions) -> bool {
        self.product_id == product_id && &self.options == options
    }
}

impl Entity for CartItem {
    type Id = CartItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: Cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    id: CartId,
    customer_id: CustomerId,
    items: Vec<CartItem>,
    converted: bool,
    converted_order_id: Option<OrderId>,
    deleted: bool,
    created_at: Option<DateTime<Utc>>,
    last_modified_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Cart {
    pub fn empty(id: CartId) -> Self {
        Self {
            id,
            customer_id: CustomerId::default(),
            items: Vec::new(),
            converted: false,
            converted_order_id: None,
            deleted: false,
            created_at: None,
            last_modified_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn is_converted(&self) -> bool {
        self.converted
    }

    pub fn converted_order_id(&self) -> Option<OrderId> {
        self.converted_order_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified_at
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Quantity already in the cart for a product + option combination.
    pub fn quantity_of(&self, product_id: ProductId, options: &ProductOptions) -> u32 {
        self.items
            .iter()
            .filter(|i| i.is_same_product(product_id, options))
            .map(|i| i.quantity)
            .sum()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.last_modified_at {
            Some(at) => at + Duration::days(CART_EXPIRY_DAYS) < now,
            None => false,
        }
    }

    fn find_same(&self, product_id: ProductId, options: &ProductOptions) -> Option<&CartItem> {
        self.items.iter().find(|i| i.is_same_product(product_id, options))
    }

    fn item_mut(&mut self, item_id: CartItemId) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }
}

impl AggregateRoot for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCart {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// `item_id` is used only when no line with the same product and options exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub sku: String,
    pub options: ProductOptions,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItemQuantity {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

/// Pull another cart's lines into this one. The caller loads the source cart
/// and passes its state; the source itself is changed by a separate command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCarts {
    pub cart_id: CartId,
    pub source_cart_id: CartId,
    pub source_items: Vec<CartItem>,
    pub source_converted: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkItemUnavailable {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkItemAvailable {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertCart {
    pub cart_id: CartId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Re-open a converted cart after its order failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCart {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartCommand {
    Create(CreateCart),
    AddItem(AddItem),
    ChangeItemQuantity(ChangeItemQuantity),
    RemoveItem(RemoveItem),
    Clear(ClearCart),
    Merge(MergeCarts),
    MarkItemUnavailable(MarkItemUnavailable),
    MarkItemAvailable(MarkItemAvailable),
    Convert(ConvertCart),
    Restore(RestoreCart),
    Delete(DeleteCart),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCreated {
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemAdded {
    pub cart_id: CartId,
    pub item: CartItem,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the resulting quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemQuantityChanged {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemRemoved {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCleared {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedQuantity {
    pub item_id: CartItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartsMerged {
    pub cart_id: CartId,
    pub source_cart_id: CartId,
    pub added: Vec<CartItem>,
    pub increased: Vec<MergedQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemMarkedUnavailable {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemMarkedAvailable {
    pub cart_id: CartId,
    pub item_id: CartItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConverted {
    pub cart_id: CartId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartRestored {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartDeleted {
    pub cart_id: CartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum CartEvent {
    CartCreated(CartCreated),
    CartItemAdded(CartItemAdded),
    CartItemQuantityChanged(CartItemQuantityChanged),
    CartItemRemoved(CartItemRemoved),
    CartCleared(CartCleared),
    CartsMerged(CartsMerged),
    CartItemMarkedUnavailable(CartItemMarkedUnavailable),
    CartItemMarkedAvailable(CartItemMarkedAvailable),
    CartConverted(CartConverted),
    CartRestored(CartRestored),
    CartDeleted(CartDeleted),
}

impl Event for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated(_) => "purchasing.cart.created",
            CartEvent::CartItemAdded(_) => "purchasing.cart.item_added",
            CartEvent::CartItemQuantityChanged(_) => "purchasing.cart.item_quantity_changed",
            CartEvent::CartItemRemoved(_) => "purchasing.cart.item_removed",
            CartEvent::CartCleared(_) => "purchasing.cart.cleared",
            CartEvent::CartsMerged(_) => "purchasing.cart.merged",
            CartEvent::CartItemMarkedUnavailable(_) => "purchasing.cart.item_unavailable",
            CartEvent::CartItemMarkedAvailable(_) => "purchasing.cart.item_available",
            CartEvent::CartConverted(_) => "purchasing.cart.converted",
            CartEvent::CartRestored(_) => "purchasing.cart.restored",
            CartEvent::CartDeleted(_) => "purchasing.cart.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CartEvent::CartCreated(e) => e.occurred_at,
            CartEvent::CartItemAdded(e) => e.occurred_at,
            CartEvent::CartItemQuantityChanged(e) => e.occurred_at,
            CartEvent::CartItemRemoved(e) => e.occurred_at,
            CartEvent::CartCleared(e) => e.occurred_at,
            CartEvent::CartsMerged(e) => e.occurred_at,
            CartEvent::CartItemMarkedUnavailable(e) => e.occurred_at,
            CartEvent::CartItemMarkedAvailable(e) => e.occurred_at,
            CartEvent::CartConverted(e) => e.occurred_at,
            CartEvent::CartRestored(e) => e.occurred_at,
            CartEvent::CartDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Cart {
    type Command = CartCommand;
    type Event = CartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CartEvent::CartCreated(e) => {
                self.id = e.cart_id;
                self.customer_id = e.customer_id.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            CartEvent::CartItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            CartEvent::CartItemQuantityChanged(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.quantity = e.quantity;
                }
            }
            CartEvent::CartItemRemoved(e) => {
                self.items.retain(|i| i.id != e.item_id);
            }
            CartEvent::CartCleared(_) => {
                self.items.clear();
            }
            CartEvent::CartsMerged(e) => {
                for bump in &e.increased {
                    if let Some(item) = self.item_mut(bump.item_id) {
                        item.quantity = bump.quantity;
                    }
                }
                self.items.extend(e.added.iter().cloned());
            }
            CartEvent::CartItemMarkedUnavailable(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.available = false;
                    item.unavailable_reason = Some(e.reason.clone());
                }
            }
            CartEvent::CartItemMarkedAvailable(e) => {
                if let Some(item) = self.item_mut(e.item_id) {
                    item.available = true;
                    item.unavailable_reason = None;
                }
            }
            CartEvent::CartConverted(e) => {
                self.converted = true;
                self.converted_order_id = Some(e.order_id);
            }
            CartEvent::CartRestored(_) => {
                self.converted = false;
                self.converted_order_id = None;
            }
            CartEvent::CartDeleted(_) => {
                self.deleted = true;
            }
        }

        self.last_modified_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CartCommand::Create(cmd) => self.handle_create(cmd),
            CartCommand::AddItem(cmd) => self.handle_add_item(cmd),
            CartCommand::ChangeItemQuantity(cmd) => self.handle_change_quantity(cmd),
            CartCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            CartCommand::Clear(cmd) => self.handle_clear(cmd),
            CartCommand::Merge(cmd) => self.handle_merge(cmd),
            CartCommand::MarkItemUnavailable(cmd) => self.handle_mark_unavailable(cmd),
            CartCommand::MarkItemAvailable(cmd) => self.handle_mark_available(cmd),
            CartCommand::Convert(cmd) => self.handle_convert(cmd),
            CartCommand::Restore(cmd) => self.handle_restore(cmd),
            CartCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Cart {
    fn ensure_exists(&self, cart_id: CartId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != cart_id {
            return Err(DomainError::invariant("cart_id mismatch"));
        }
        Ok(())
    }

    /// Existing and still open for modification.
    fn ensure_modifiable(&self, cart_id: CartId) -> Result<(), DomainError> {
        self.ensure_exists(cart_id)?;
        if self.converted {
            return Err(CartErrorCode::AlreadyConverted.with_detail("Cannot modify a converted cart"));
        }
        Ok(())
    }

    fn existing_item(&self, item_id: CartItemId) -> Result<&CartItem, DomainError> {
        self.item(item_id)
            .ok_or_else(|| CartErrorCode::InvalidState.with_detail(format!("Cart item not found: {item_id}")))
    }

    fn handle_create(&self, cmd: &CreateCart) -> Result<Vec<CartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("cart already exists"));
        }
        if cmd.customer_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("customer_id cannot be empty"));
        }

        Ok(vec![CartEvent::CartCreated(CartCreated {
            cart_id: cmd.cart_id,
            customer_id: cmd.customer_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        ensure_quantity(cmd.quantity)?;
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }

        if let Some(existing) = self.find_same(cmd.product_id, &cmd.options) {
            let quantity = merged_quantity(existing.quantity, cmd.quantity)?;
            return Ok(vec![CartEvent::CartItemQuantityChanged(CartItemQuantityChanged {
                cart_id: cmd.cart_id,
                item_id: existing.id,
                quantity,
                occurred_at: cmd.occurred_at,
            })]);
        }

        if self.items.len() >= MAX_ITEM_TYPES {
            return Err(CartErrorCode::ItemLimitExceeded.with_detail(format!(
                "Cannot add more than {MAX_ITEM_TYPES} different product types"
            )));
        }
        if self.item(cmd.item_id).is_some() {
            return Err(DomainError::conflict(format!("cart item id already used: {}", cmd.item_id)));
        }

        Ok(vec![CartEvent::CartItemAdded(CartItemAdded {
            cart_id: cmd.cart_id,
            item: CartItem {
                id: cmd.item_id,
                product_id: cmd.product_id,
                sku: cmd.sku.clone(),
                options: cmd.options.clone(),
                quantity: cmd.quantity,
                added_at: cmd.occurred_at,
                available: true,
                unavailable_reason: None,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(&self, cmd: &ChangeItemQuantity) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        self.existing_item(cmd.item_id)?;
        ensure_quantity(cmd.quantity)?;

        Ok(vec![CartEvent::CartItemQuantityChanged(CartItemQuantityChanged {
            cart_id: cmd.cart_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        self.existing_item(cmd.item_id)?;

        Ok(vec![CartEvent::CartItemRemoved(CartItemRemoved {
            cart_id: cmd.cart_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_clear(&self, cmd: &ClearCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;

        Ok(vec![CartEvent::CartCleared(CartCleared {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_merge(&self, cmd: &MergeCarts) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        if cmd.source_cart_id == cmd.cart_id {
            return Err(CartErrorCode::InvalidState.with_detail("Cannot merge a cart into itself"));
        }
        if cmd.source_converted {
            return Err(CartErrorCode::InvalidState.with_detail("Cannot merge a converted cart"));
        }

        // Simulate item-by-item addition so limits apply exactly as for AddItem.
        let mut working = self.items.clone();
        let mut added: Vec<CartItem> = Vec::new();
        let mut increased: Vec<MergedQuantity> = Vec::new();

        for source in &cmd.source_items {
            if let Some(target) = working
                .iter_mut()
                .find(|i| i.is_same_product(source.product_id, &source.options))
            {
                target.quantity = merged_quantity(target.quantity, source.quantity)?;
                if added.iter().any(|a| a.id == target.id) {
                    if let Some(a) = added.iter_mut().find(|a| a.id == target.id) {
                        a.quantity = target.quantity;
                    }
                } else if let Some(bump) = increased.iter_mut().find(|b| b.item_id == target.id) {
                    bump.quantity = target.quantity;
                } else {
                    increased.push(MergedQuantity {
                        item_id: target.id,
                        quantity: target.quantity,
                    });
                }
                continue;
            }

            if working.len() >= MAX_ITEM_TYPES {
                return Err(CartErrorCode::ItemLimitExceeded.with_detail(format!(
                    "Cannot add more than {MAX_ITEM_TYPES} different product types"
                )));
            }
            ensure_quantity(source.quantity)?;
            if working.iter().any(|i| i.id == source.id) {
                return Err(DomainError::conflict(format!("cart item id already used: {}", source.id)));
            }

            let item = CartItem {
                added_at: cmd.occurred_at,
                available: true,
                unavailable_reason: None,
                ..source.clone()
            };
            working.push(item.clone());
            added.push(item);
        }

        Ok(vec![CartEvent::CartsMerged(CartsMerged {
            cart_id: cmd.cart_id,
            source_cart_id: cmd.source_cart_id,
            added,
            increased,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_unavailable(&self, cmd: &MarkItemUnavailable) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        let item = self.existing_item(cmd.item_id)?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }
        if !item.available && item.unavailable_reason.as_deref() == Some(cmd.reason.as_str()) {
            return Ok(vec![]);
        }

        Ok(vec![CartEvent::CartItemMarkedUnavailable(CartItemMarkedUnavailable {
            cart_id: cmd.cart_id,
            item_id: cmd.item_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_available(&self, cmd: &MarkItemAvailable) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        let item = self.existing_item(cmd.item_id)?;
        if item.available {
            return Ok(vec![]);
        }

        Ok(vec![CartEvent::CartItemMarkedAvailable(CartItemMarkedAvailable {
            cart_id: cmd.cart_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_modifiable(cmd.cart_id)?;
        if self.items.is_empty() {
            return Err(CartErrorCode::InvalidState.with_detail("Cannot convert an empty cart"));
        }
        if let Some(item) = self.items.iter().find(|i| !i.available) {
            return Err(CartErrorCode::InvalidState.with_detail(format!(
                "Item {} is unavailable: {}",
                item.id,
                item.unavailable_reason.as_deref().unwrap_or("unknown reason")
            )));
        }

        Ok(vec![CartEvent::CartConverted(CartConverted {
            cart_id: cmd.cart_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_exists(cmd.cart_id)?;
        if !self.converted {
            return Err(CartErrorCode::InvalidState.with_detail("Only converted carts can be restored"));
        }

        Ok(vec![CartEvent::CartRestored(CartRestored {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteCart) -> Result<Vec<CartEvent>, DomainError> {
        self.ensure_exists(cmd.cart_id)?;

        Ok(vec![CartEvent::CartDeleted(CartDeleted {
            cart_id: cmd.cart_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn ensure_quantity(quantity: u32) -> Result<(), DomainError> {
    if !(MIN_ITEM_QUANTITY..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(CartErrorCode::InvalidQuantity.with_detail(format!(
            "Quantity must be between {MIN_ITEM_QUANTITY} and {MAX_ITEM_QUANTITY}, got {quantity}"
        )));
    }
    Ok(())
}

fn merged_quantity(current: u32, extra: u32) -> Result<u32, DomainError> {
    let total = current.saturating_add(extra);
    ensure_quantity(total)?;
    Ok(total)
}
