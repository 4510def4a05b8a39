//! Purchasing ports backed by the catalog and stock read models and the
//! command dispatcher.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use commerce_events::{EventBus, EventEnvelope};
use commerce_products::{ProductId, VariantStatus};
use commerce_purchasing::{
    CatalogProduct, CatalogVariant, InventoryChecker, InventoryManager, PortError, ProductCatalog, ProductOptions,
};
use commerce_search::ProductDocument;
use commerce_stock::{AGGREGATE_TYPE as STOCK_AGGREGATE_TYPE, DecreaseStock, IncreaseStock, Stock, StockCommand, StockId};

use crate::cache::{Decrement, StockCache};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::{ProductCatalogProjection, StockLevelsProjection};

const MAX_ATTEMPTS: usize = 3;

pub struct CatalogAdapter {
    catalog: Arc<ProductCatalogProjection>,
}

impl CatalogAdapter {
    pub fn new(catalog: Arc<ProductCatalogProjection>) -> Self {
        Self { catalog }
    }
}

/// Deleted products do not exist as far as purchasing is concerned.
pub fn catalog_product(doc: &ProductDocument) -> Option<CatalogProduct> {
    if doc.is_deleted {
        return None;
    }
    let purchasable = doc.is_searchable();
    Some(CatalogProduct {
        product_id: doc.id,
        name: doc.name.clone(),
        purchasable,
        variants: doc
            .variants
            .iter()
            .map(|v| CatalogVariant {
                sku: v.sku.clone(),
                options: ProductOptions::new(v.options.clone()),
                unit_price: v.price.clone(),
                purchasable: purchasable && v.status == VariantStatus::Active,
            })
            .collect(),
    })
}

impl ProductCatalog for CatalogAdapter {
    fn product(&self, product_id: ProductId) -> Result<Option<CatalogProduct>, PortError> {
        Ok(self.catalog.get(product_id).and_then(|doc| catalog_product(&doc)))
    }
}

/// Stock checks read the cache (falling back to the read model); stock
/// changes go through the `Stock` aggregate, with the cache reserving units
/// first so concurrent checkouts cannot oversell.
pub struct InventoryAdapter<S, B> {
    levels: Arc<StockLevelsProjection>,
    cache: Arc<dyn StockCache>,
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> InventoryAdapter<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        levels: Arc<StockLevelsProjection>,
        cache: Arc<dyn StockCache>,
        dispatcher: Arc<CommandDispatcher<S, B>>,
    ) -> Self {
        Self { levels, cache, dispatcher }
    }

    fn dispatch_stock(&self, stock_id: StockId, command: impl Fn() -> StockCommand) -> Result<(), DispatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .dispatcher
                .dispatch(stock_id.0, STOCK_AGGREGATE_TYPE, command(), |id| Stock::empty(StockId::new(id)));
            match result {
                Err(DispatchError::Concurrency(msg)) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!(stock_id = %stock_id, attempt, conflict = %msg, "retrying stock command");
                }
                Err(DispatchError::Publish(msg)) => {
                    // Committed; the read model catches up on the next rebuild.
                    tracing::warn!(stock_id = %stock_id, error = %msg, "stock change committed but not published");
                    return Ok(());
                }
                other => return other.map(|_| ()),
            }
        }
    }
}

fn port_error(sku: &str, err: DispatchError) -> PortError {
    match err {
        DispatchError::InvariantViolation(_) | DispatchError::NotFound => {
            PortError::InsufficientStock { sku: sku.to_string() }
        }
        other => PortError::Unavailable(other.to_string()),
    }
}

impl<S, B> InventoryChecker for InventoryAdapter<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn available(&self, sku: &str) -> Result<Option<i64>, PortError> {
        let Some(stock_id) = self.levels.stock_id_for(sku) else {
            return Ok(None);
        };
        Ok(self
            .cache
            .get(&stock_id)
            .or_else(|| self.levels.get(stock_id).map(|v| v.quantity)))
    }
}

impl<S, B> InventoryManager for InventoryAdapter<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn reduce(&self, sku: &str, quantity: u32) -> Result<(), PortError> {
        let Some(stock_id) = self.levels.stock_id_for(sku) else {
            return Err(PortError::InsufficientStock { sku: sku.to_string() });
        };
        let quantity = i64::from(quantity);

        let reserved = match self.cache.try_decrement(&stock_id, quantity) {
            Decrement::Insufficient { available } => {
                tracing::debug!(sku, available, requested = quantity, "stock reservation refused");
                return Err(PortError::InsufficientStock { sku: sku.to_string() });
            }
            Decrement::Taken(_) => true,
            Decrement::Missing => false,
        };

        let result = self.dispatch_stock(stock_id, || {
            StockCommand::Decrease(DecreaseStock { stock_id, quantity, occurred_at: Utc::now() })
        });
        if let Err(err) = result {
            if reserved {
                self.cache.increment(&stock_id, quantity);
            }
            return Err(port_error(sku, err));
        }
        Ok(())
    }

    fn restore(&self, sku: &str, quantity: u32) -> Result<(), PortError> {
        let Some(stock_id) = self.levels.stock_id_for(sku) else {
            return Err(PortError::Unavailable(format!("no stock registered for sku {sku}")));
        };
        let quantity = i64::from(quantity);

        self.dispatch_stock(stock_id, || {
            StockCommand::Increase(IncreaseStock { stock_id, quantity, occurred_at: Utc::now() })
        })
        .map_err(|e| PortError::Unavailable(e.to_string()))?;
        self.cache.increment(&stock_id, quantity);
        Ok(())
    }
}
