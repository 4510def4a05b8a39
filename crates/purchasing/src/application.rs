//! Purchasing use cases, expressed over the ports in [`crate::ports`].
//!
//! Each function reads through ports and returns the command(s) to dispatch;
//! persisting those commands is the caller's job. The exception is
//! [`settle_payment`] / [`release_stock`], which move stock through
//! [`InventoryManager`] and compensate on partial failure.

use chrono::{DateTime, Utc};
use thiserror::Error;

use commerce_core::{DomainError, Money, DEFAULT_CURRENCY};
use commerce_products::ProductId;

use crate::cart::{AddItem, Cart, CartCommand, CartErrorCode, CartItemId, ConvertCart, MarkItemAvailable, MarkItemUnavailable};
use crate::common::{CustomerId, ProductOptions};
use crate::order::{
    ConfirmPayment, CreateOrder, MarkOutOfStock, NewOrderItem, Order, OrderCommand, OrderId,
    OrderStatus, PaymentId,
};
use crate::ports::{CatalogProduct, CatalogVariant, InventoryChecker, InventoryManager, PortError, ProductCatalog};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UseCaseError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Shopper's request to put a product into a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub options: ProductOptions,
    pub quantity: u32,
}

/// Validate an add-to-cart request against catalog and stock.
pub fn prepare_add_item(
    cart: &Cart,
    request: &AddItemRequest,
    item_id: CartItemId,
    occurred_at: DateTime<Utc>,
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<CartCommand, UseCaseError> {
    if !cart.exists() {
        return Err(DomainError::not_found().into());
    }
    if cart.is_converted() {
        return Err(CartErrorCode::AlreadyConverted.error().into());
    }

    let product = purchasable_product(catalog, request.product_id)?;
    let variant = select_variant(&product, &request.options)?;

    let wanted = cart
        .quantity_of(request.product_id, &request.options)
        .saturating_add(request.quantity);
    ensure_in_stock(inventory, &variant.sku, wanted)?;

    Ok(CartCommand::AddItem(AddItem {
        cart_id: cart.id_typed(),
        item_id,
        product_id: request.product_id,
        sku: variant.sku.clone(),
        options: request.options.clone(),
        quantity: request.quantity,
        occurred_at,
    }))
}

/// One cart line with its current catalog price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: Option<String>,
    pub quantity: u32,
    pub unit_price: Option<Money>,
    pub subtotal: Option<Money>,
    pub available: bool,
    pub unavailable_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartPricing {
    pub lines: Vec<PricedLine>,
    pub total: Money,
    /// Items whose product or SKU is gone from the catalog.
    pub missing: Vec<CartItemId>,
}

/// Price every line with current catalog prices. Unavailable lines are shown
/// but not counted in the total.
pub fn price_cart(cart: &Cart, catalog: &dyn ProductCatalog) -> Result<CartPricing, UseCaseError> {
    let mut lines = Vec::with_capacity(cart.item_count());
    let mut missing = Vec::new();
    let mut total: Option<Money> = None;

    for item in cart.items() {
        let product = catalog.product(item.product_id)?;
        let variant = product.as_ref().and_then(|p| p.variant_by_sku(&item.sku));
        if variant.is_none() {
            missing.push(item.id);
        }

        let unit_price = variant.map(|v| v.unit_price.clone());
        let subtotal = match &unit_price {
            Some(price) => Some(price.times(item.quantity)?),
            None => None,
        };
        if let (Some(sub), true) = (&subtotal, item.available) {
            total = Some(match total {
                Some(t) => t.checked_add(sub)?,
                None => sub.clone(),
            });
        }

        lines.push(PricedLine {
            item_id: item.id,
            product_id: item.product_id,
            sku: item.sku.clone(),
            name: product.as_ref().map(|p| p.name.clone()),
            quantity: item.quantity,
            unit_price,
            subtotal,
            available: item.available,
            unavailable_reason: item.unavailable_reason.clone(),
        });
    }

    Ok(CartPricing {
        lines,
        total: total.unwrap_or_else(|| Money::zero(DEFAULT_CURRENCY)),
        missing,
    })
}

/// Commands that bring every line's availability flag up to date.
pub fn review_availability(
    cart: &Cart,
    occurred_at: DateTime<Utc>,
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<Vec<CartCommand>, UseCaseError> {
    if !cart.exists() || cart.is_converted() {
        return Ok(Vec::new());
    }

    let mut commands = Vec::new();
    for item in cart.items() {
        let reason = unavailability(item.product_id, &item.sku, item.quantity, catalog, inventory)?;
        match reason {
            Some(reason) => {
                if item.available || item.unavailable_reason.as_deref() != Some(reason.as_str()) {
                    commands.push(CartCommand::MarkItemUnavailable(MarkItemUnavailable {
                        cart_id: cart.id_typed(),
                        item_id: item.id,
                        reason,
                        occurred_at,
                    }));
                }
            }
            None if !item.available => {
                commands.push(CartCommand::MarkItemAvailable(MarkItemAvailable {
                    cart_id: cart.id_typed(),
                    item_id: item.id,
                    occurred_at,
                }));
            }
            None => {}
        }
    }
    Ok(commands)
}

fn unavailability(
    product_id: ProductId,
    sku: &str,
    quantity: u32,
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<Option<String>, PortError> {
    let Some(product) = catalog.product(product_id)? else {
        return Ok(Some("product no longer exists".to_string()));
    };
    if !product.purchasable {
        return Ok(Some("product is not on sale".to_string()));
    }
    match product.variant_by_sku(sku) {
        Some(v) if v.purchasable => {}
        _ => return Ok(Some("option is no longer sold".to_string())),
    }
    let on_hand = inventory.available(sku)?.unwrap_or(0);
    if on_hand < i64::from(quantity) {
        return Ok(Some(format!("only {on_hand} left in stock")));
    }
    Ok(None)
}

/// A requested order line before pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub options: ProductOptions,
    pub quantity: u32,
}

/// Everything about a new order except its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub message: Option<String>,
    pub channel: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Price lines from the catalog and check stock, producing `CreateOrder`.
pub fn prepare_order(
    draft: &OrderDraft,
    lines: &[OrderLineRequest],
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<OrderCommand, UseCaseError> {
    let create = build_create_order(draft, lines, None, catalog, inventory)?;
    Ok(OrderCommand::Create(create))
}

/// The pair of commands that turns a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub create_order: OrderCommand,
    pub convert_cart: CartCommand,
}

pub fn prepare_checkout(
    cart: &Cart,
    draft: &OrderDraft,
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<Checkout, UseCaseError> {
    if !cart.exists() {
        return Err(DomainError::not_found().into());
    }
    if cart.is_converted() {
        return Err(CartErrorCode::AlreadyConverted.error().into());
    }
    if cart.items().is_empty() {
        return Err(CartErrorCode::InvalidState.with_detail("Cannot check out an empty cart").into());
    }
    if let Some(item) = cart.items().iter().find(|i| !i.available) {
        return Err(CartErrorCode::InvalidState
            .with_detail(format!("Item {} is unavailable", item.id))
            .into());
    }
    if &draft.customer_id != cart.customer_id() {
        return Err(DomainError::Unauthorized.into());
    }

    let lines: Vec<OrderLineRequest> = cart
        .items()
        .iter()
        .map(|i| OrderLineRequest {
            product_id: i.product_id,
            options: i.options.clone(),
            quantity: i.quantity,
        })
        .collect();
    let create = build_create_order(draft, &lines, Some(cart), catalog, inventory)?;

    Ok(Checkout {
        create_order: OrderCommand::Create(create),
        convert_cart: CartCommand::Convert(ConvertCart {
            cart_id: cart.id_typed(),
            order_id: draft.order_id,
            occurred_at: draft.occurred_at,
        }),
    })
}

fn build_create_order(
    draft: &OrderDraft,
    lines: &[OrderLineRequest],
    cart: Option<&Cart>,
    catalog: &dyn ProductCatalog,
    inventory: &dyn InventoryChecker,
) -> Result<CreateOrder, UseCaseError> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one item").into());
    }

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let product = purchasable_product(catalog, line.product_id)?;
        let variant = select_variant(&product, &line.options)?;
        ensure_in_stock(inventory, &variant.sku, line.quantity)?;

        items.push(NewOrderItem {
            product_id: line.product_id,
            sku: variant.sku.clone(),
            name: product.name.clone(),
            unit_price: variant.unit_price.clone(),
            quantity: line.quantity,
            options: line.options.clone(),
        });
    }

    Ok(CreateOrder {
        order_id: draft.order_id,
        customer_id: draft.customer_id.clone(),
        items,
        message: draft.message.clone(),
        channel: draft.channel.clone(),
        source_cart_id: cart.map(Cart::id_typed),
        occurred_at: draft.occurred_at,
    })
}

/// Take stock for every line of a pending order.
///
/// Returns `ConfirmPayment` when all lines were reserved. When a line runs
/// short, stock already taken is put back and `MarkOutOfStock` is returned
/// instead.
pub fn settle_payment(
    order: &Order,
    payment_id: PaymentId,
    occurred_at: DateTime<Utc>,
    inventory: &dyn InventoryManager,
) -> Result<OrderCommand, UseCaseError> {
    if !order.is_created() {
        return Err(DomainError::not_found().into());
    }
    if order.status() != OrderStatus::Pending {
        return Err(DomainError::invariant(format!(
            "cannot confirm payment for an order in status {}",
            order.status().as_str()
        ))
        .into());
    }

    let mut taken: Vec<(&str, u32)> = Vec::with_capacity(order.items().len());
    for item in order.items() {
        match inventory.reduce(&item.sku, item.quantity) {
            Ok(()) => taken.push((item.sku.as_str(), item.quantity)),
            Err(PortError::InsufficientStock { sku }) => {
                give_back(&taken, inventory);
                tracing::info!(order_id = %order.id_typed(), sku = %sku, "order marked out of stock");
                return Ok(OrderCommand::MarkOutOfStock(MarkOutOfStock {
                    order_id: order.id_typed(),
                    sku,
                    occurred_at,
                }));
            }
            Err(err) => {
                give_back(&taken, inventory);
                return Err(err.into());
            }
        }
    }

    Ok(OrderCommand::ConfirmPayment(ConfirmPayment {
        order_id: order.id_typed(),
        payment_id,
        occurred_at,
    }))
}

/// Put back stock held by a paid or completed order. Returns units restored.
pub fn release_stock(order: &Order, inventory: &dyn InventoryManager) -> Result<u64, UseCaseError> {
    if !order.holds_stock() {
        return Ok(0);
    }
    let mut restored = 0u64;
    for item in order.items() {
        inventory.restore(&item.sku, item.quantity)?;
        restored += u64::from(item.quantity);
    }
    Ok(restored)
}

fn give_back(taken: &[(&str, u32)], inventory: &dyn InventoryManager) {
    for (sku, quantity) in taken {
        if let Err(err) = inventory.restore(sku, *quantity) {
            tracing::warn!(sku = %sku, quantity = *quantity, error = %err, "failed to restore stock");
        }
    }
}

fn purchasable_product(catalog: &dyn ProductCatalog, product_id: ProductId) -> Result<CatalogProduct, UseCaseError> {
    let product = catalog
        .product(product_id)?
        .ok_or_else(DomainError::not_found)?;
    if !product.purchasable {
        return Err(CartErrorCode::InvalidState
            .with_detail(format!("Product {product_id} is not available for purchase"))
            .into());
    }
    Ok(product)
}

fn select_variant<'a>(product: &'a CatalogProduct, options: &ProductOptions) -> Result<&'a CatalogVariant, UseCaseError> {
    if let Some(name) = options.first_missing(product.required_options()) {
        return Err(CartErrorCode::RequiredOptionMissing.with_detail(name).into());
    }
    let variant = product
        .variant_for(options)
        .ok_or_else(|| CartErrorCode::RequiredOptionMissing.with_detail("no variant matches the selected options"))?;
    if !variant.purchasable {
        return Err(CartErrorCode::InvalidState
            .with_detail(format!("Variant {} is not available for purchase", variant.sku))
            .into());
    }
    Ok(variant)
}

fn ensure_in_stock(inventory: &dyn InventoryChecker, sku: &str, wanted: u32) -> Result<(), UseCaseError> {
    let on_hand = inventory.available(sku)?.unwrap_or(0);
    if i64::from(wanted) > on_hand {
        return Err(CartErrorCode::InsufficientStock
            .with_detail(format!("requested {wanted}, available {on_hand} for {sku}"))
            .into());
    }
    Ok(())
}
