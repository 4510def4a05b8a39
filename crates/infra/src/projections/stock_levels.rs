use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use commerce_events::EventEnvelope;
use commerce_stock::{AGGREGATE_TYPE, Stock, StockEvent, StockId, StockStatus};

use super::{Projection, ProjectionError, StreamFold};
use crate::cache::StockCache;
use crate::read_model::ReadStore;

/// Stock on hand for one SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    pub stock_id: StockId,
    pub sku: String,
    pub quantity: i64,
    pub status: StockStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Stock> for StockView {
    fn from(stock: &Stock) -> Self {
        Self {
            stock_id: stock.id_typed(),
            sku: stock.sku().to_string(),
            quantity: stock.quantity(),
            status: stock.status(),
            created_at: stock.created_at(),
            updated_at: stock.updated_at(),
        }
    }
}

/// Stock levels by id and by SKU, written through to the stock cache.
pub struct StockLevelsProjection {
    fold: StreamFold<Stock>,
    stocks: Arc<dyn ReadStore<StockId, StockView>>,
    skus: Arc<dyn ReadStore<String, StockId>>,
    cache: Option<Arc<dyn StockCache>>,
}

impl StockLevelsProjection {
    pub fn new(stocks: Arc<dyn ReadStore<StockId, StockView>>, skus: Arc<dyn ReadStore<String, StockId>>) -> Self {
        Self {
            fold: StreamFold::new(AGGREGATE_TYPE, |id| Stock::empty(StockId::new(id))),
            stocks,
            skus,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn StockCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn get(&self, id: StockId) -> Option<StockView> {
        self.stocks.get(&id)
    }

    pub fn stock_id_for(&self, sku: &str) -> Option<StockId> {
        self.skus.get(&sku.to_string())
    }

    pub fn by_sku(&self, sku: &str) -> Option<StockView> {
        self.get(self.stock_id_for(sku)?)
    }

    /// Units on hand: cached value when present, else the read model.
    pub fn available(&self, id: StockId) -> Option<i64> {
        self.cache
            .as_ref()
            .and_then(|c| c.get(&id))
            .or_else(|| self.get(id).map(|v| v.quantity))
    }

    pub fn list(&self) -> Vec<StockView> {
        let mut views = self.stocks.list();
        views.sort_by(|a, b| a.sku.cmp(&b.sku));
        views
    }
}

impl Projection for StockLevelsProjection {
    fn name(&self) -> &'static str {
        "stock_levels"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &[AGGREGATE_TYPE]
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some((event, stock)) = self.fold.fold(envelope)? else {
            return Ok(());
        };

        let view = StockView::from(&stock);
        if let StockEvent::StockRegistered(e) = &event {
            match self.skus.get(&e.sku) {
                Some(existing) if existing != view.stock_id => {
                    tracing::warn!(sku = %e.sku, %existing, stock_id = %view.stock_id, "sku already indexed; keeping first stock");
                }
                _ => self.skus.upsert(e.sku.clone(), view.stock_id),
            }
        }
        if let Some(cache) = &self.cache {
            cache.set(&view.stock_id, view.quantity);
        }
        tracing::debug!(stock_id = %view.stock_id, quantity = view.quantity, "stock level updated");
        self.stocks.upsert(view.stock_id, view);
        Ok(())
    }

    fn reset(&self) {
        if let Some(cache) = &self.cache {
            for view in self.stocks.list() {
                cache.evict(&view.stock_id);
            }
        }
        self.stocks.clear();
        self.skus.clear();
        self.fold.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use commerce_core::AggregateId;
    use commerce_stock::{StockDecreased, StockRegistered};

    use super::*;
    use crate::cache::InMemoryStockCache;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;

    fn projection(cache: Arc<InMemoryStockCache>) -> StockLevelsProjection {
        StockLevelsProjection::new(
            Arc::new(InMemoryReadStore::<StockId, StockView>::new()),
            Arc::new(InMemoryReadStore::<String, StockId>::new()),
        )
        .with_cache(cache)
    }

    #[test]
    fn tracks_quantity_and_writes_through_to_cache() {
        let cache = Arc::new(InMemoryStockCache::new());
        let p = projection(cache.clone());
        let id = StockId::new(AggregateId::new());

        let registered = StockEvent::StockRegistered(StockRegistered {
            stock_id: id,
            sku: "SKU-1".to_string(),
            quantity: 10,
            occurred_at: Utc::now(),
        });
        let decreased = StockEvent::StockDecreased(StockDecreased {
            stock_id: id,
            quantity: 10,
            quantity_after: 0,
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&envelope(id.0, AGGREGATE_TYPE, 1, &registered)).unwrap();
        assert_eq!(p.by_sku("SKU-1").unwrap().quantity, 10);
        assert_eq!(cache.get(&id), Some(10));

        p.apply_envelope(&envelope(id.0, AGGREGATE_TYPE, 2, &decreased)).unwrap();
        let view = p.get(id).unwrap();
        assert_eq!(view.quantity, 0);
        assert_eq!(view.status, StockStatus::OutOfStock);
        assert_eq!(p.available(id), Some(0));
    }

    #[test]
    fn second_registration_of_a_sku_does_not_steal_the_index() {
        let p = projection(Arc::new(InMemoryStockCache::new()));
        let first = StockId::new(AggregateId::new());
        let second = StockId::new(AggregateId::new());
        for id in [first, second] {
            let registered = StockEvent::StockRegistered(StockRegistered {
                stock_id: id,
                sku: "SKU-DUP".to_string(),
                quantity: 1,
                occurred_at: Utc::now(),
            });
            p.apply_envelope(&envelope(id.0, AGGREGATE_TYPE, 1, &registered)).unwrap();
        }
        assert_eq!(p.stock_id_for("SKU-DUP"), Some(first));
    }

    #[test]
    fn reset_clears_cache_entries() {
        let cache = Arc::new(InMemoryStockCache::new());
        let p = projection(cache.clone());
        let id = StockId::new(AggregateId::new());
        let registered = StockEvent::StockRegistered(StockRegistered {
            stock_id: id,
            sku: "SKU-2".to_string(),
            quantity: 3,
            occurred_at: Utc::now(),
        });
        p.apply_envelope(&envelope(id.0, AGGREGATE_TYPE, 1, &registered)).unwrap();

        p.reset();
        assert!(p.by_sku("SKU-2").is_none());
        assert_eq!(cache.get(&id), None);
    }
}
