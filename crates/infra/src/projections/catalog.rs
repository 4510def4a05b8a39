use std::sync::Arc;

use serde_json::Value as JsonValue;

use commerce_events::EventEnvelope;
use commerce_products::{AGGREGATE_TYPE, Product, ProductEvent, ProductId};
use commerce_search::{ProductDocument, SearchIndex, VariantDocument, to_document};

use super::{Projection, ProjectionError, StreamFold};
use crate::cache::ProductCache;
use crate::read_model::ReadStore;

/// Product catalog read model.
///
/// Maintains the product documents served by the API, a SKU → product index,
/// and keeps the product cache and the search index in step.
pub struct ProductCatalogProjection {
    fold: StreamFold<Product>,
    products: Arc<dyn ReadStore<ProductId, ProductDocument>>,
    skus: Arc<dyn ReadStore<String, ProductId>>,
    cache: Option<Arc<dyn ProductCache>>,
    search: Option<Arc<dyn SearchIndex>>,
}

impl ProductCatalogProjection {
    pub fn new(
        products: Arc<dyn ReadStore<ProductId, ProductDocument>>,
        skus: Arc<dyn ReadStore<String, ProductId>>,
    ) -> Self {
        Self {
            fold: StreamFold::new(AGGREGATE_TYPE, |id| Product::empty(ProductId::new(id))),
            products,
            skus,
            cache: None,
            search: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ProductCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(search);
        self
    }

    /// Cache first, then the read store; a store hit repopulates the cache.
    /// Soft-deleted products are not served.
    pub fn get(&self, id: ProductId) -> Option<ProductDocument> {
        if let Some(doc) = self.cache.as_ref().and_then(|c| c.get(&id)) {
            return (!doc.is_deleted).then_some(doc);
        }
        let doc = self.products.get(&id).filter(|d| !d.is_deleted)?;
        if let Some(cache) = &self.cache {
            cache.put(doc.clone());
        }
        Some(doc)
    }

    pub fn by_sku(&self, sku: &str) -> Option<(ProductDocument, VariantDocument)> {
        let product_id = self.skus.get(&sku.to_string())?;
        let doc = self.get(product_id)?;
        let variant = doc.variants.iter().find(|v| v.sku == sku)?.clone();
        Some((doc, variant))
    }

    /// Live products, newest first.
    pub fn list(&self) -> Vec<ProductDocument> {
        let mut docs: Vec<_> = self.products.list().into_iter().filter(|d| !d.is_deleted).collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        docs
    }

    fn index(&self, doc: &ProductDocument) {
        let Some(search) = &self.search else { return };
        let result = if doc.is_deleted {
            search.remove(doc.id)
        } else {
            search.index(doc.clone())
        };
        if let Err(e) = result {
            tracing::warn!(product_id = %doc.id, error = %e, "search index update failed");
        }
    }

    fn refresh_cache(&self, doc: &ProductDocument) {
        let Some(cache) = &self.cache else { return };
        if doc.is_deleted {
            cache.evict(&doc.id);
        } else {
            cache.put_if_present(doc.clone());
        }
    }
}

impl Projection for ProductCatalogProjection {
    fn name(&self) -> &'static str {
        "product_catalog"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &[AGGREGATE_TYPE]
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let Some((event, product)) = self.fold.fold(envelope)? else {
            return Ok(());
        };

        let doc = to_document(&product);
        match &event {
            ProductEvent::ProductCreated(e) => {
                for v in &e.variants {
                    self.skus.upsert(v.sku.clone(), doc.id);
                }
            }
            ProductEvent::VariantsAdded(e) => {
                for v in &e.variants {
                    self.skus.upsert(v.sku.clone(), doc.id);
                }
            }
            ProductEvent::VariantRemoved(e) => self.skus.remove(&e.sku),
            _ => {}
        }

        self.products.upsert(doc.id, doc.clone());
        self.refresh_cache(&doc);
        self.index(&doc);

        tracing::debug!(
            product_id = %doc.id,
            event_type = envelope.event_type(),
            seq = envelope.sequence_number(),
            "product catalog updated"
        );
        Ok(())
    }

    fn reset(&self) {
        for doc in self.products.list() {
            if let Some(cache) = &self.cache {
                cache.evict(&doc.id);
            }
            if let Some(search) = &self.search {
                let _ = search.remove(doc.id);
            }
        }
        self.products.clear();
        self.skus.clear();
        self.fold.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use commerce_core::{AggregateId, Money};
    use commerce_products::{
        ProductActivated, ProductCreated, ProductDeleted, ProductInfoUpdated, ProductStatus, ProductVariant,
        SellerId, VariantRemoved,
    };
    use commerce_search::{InMemorySearchIndex, SearchOptions};

    use super::*;
    use crate::cache::InMemoryProductCache;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;

    struct Fixture {
        projection: ProductCatalogProjection,
        cache: Arc<InMemoryProductCache>,
        search: Arc<InMemorySearchIndex>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(InMemoryProductCache::default());
        let search = Arc::new(InMemorySearchIndex::new());
        let projection = ProductCatalogProjection::new(
            Arc::new(InMemoryReadStore::<ProductId, ProductDocument>::new()),
            Arc::new(InMemoryReadStore::<String, ProductId>::new()),
        )
        .with_cache(cache.clone())
        .with_search(search.clone());
        Fixture { projection, cache, search }
    }

    fn created(id: ProductId) -> ProductEvent {
        let now = Utc::now();
        let mut red = BTreeMap::new();
        red.insert("color".to_string(), "red".to_string());
        ProductEvent::ProductCreated(ProductCreated {
            product_id: id,
            seller_id: SellerId::new("seller-1"),
            name: "Trail Runner".to_string(),
            brand: "Acme".to_string(),
            description: "light shoe".to_string(),
            category_id: "shoes".to_string(),
            base_price: Money::krw(59_000),
            variants: vec![
                ProductVariant::new(&id, BTreeMap::new(), Money::krw(59_000), now),
                ProductVariant::new(&id, red, Money::krw(61_000), now),
            ],
            occurred_at: now,
        })
    }

    fn apply(p: &ProductCatalogProjection, id: ProductId, seq: u64, event: &ProductEvent) {
        p.apply_envelope(&envelope(id.0, AGGREGATE_TYPE, seq, event)).unwrap();
    }

    #[test]
    fn created_product_is_stored_and_sku_indexed() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        let event = created(id);
        apply(&f.projection, id, 1, &event);

        let doc = f.projection.get(id).unwrap();
        assert_eq!(doc.name, "Trail Runner");
        assert_eq!(doc.variants.len(), 2);

        let ProductEvent::ProductCreated(c) = &event else { unreachable!() };
        let (found, variant) = f.projection.by_sku(&c.variants[1].sku).unwrap();
        assert_eq!(found.id, id);
        assert_eq!(variant.price, Money::krw(61_000));
    }

    #[test]
    fn activation_makes_the_product_searchable() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        apply(&f.projection, id, 1, &created(id));
        apply(
            &f.projection,
            id,
            2,
            &ProductEvent::ProductActivated(ProductActivated { product_id: id, occurred_at: Utc::now() }),
        );

        assert_eq!(f.projection.get(id).unwrap().status, ProductStatus::Active);
        let page = f
            .search
            .search(&SearchOptions { keyword: Some("runner".to_string()), ..SearchOptions::default() })
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn cached_entries_follow_updates_and_deletes() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        apply(&f.projection, id, 1, &created(id));

        // First read populates the cache.
        f.projection.get(id).unwrap();
        assert!(f.cache.get(&id).is_some());

        apply(
            &f.projection,
            id,
            2,
            &ProductEvent::ProductInfoUpdated(ProductInfoUpdated {
                product_id: id,
                name: "Road Runner".to_string(),
                brand: "Acme".to_string(),
                description: String::new(),
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(f.cache.get(&id).unwrap().name, "Road Runner");

        apply(
            &f.projection,
            id,
            3,
            &ProductEvent::ProductDeleted(ProductDeleted { product_id: id, occurred_at: Utc::now() }),
        );
        assert!(f.cache.get(&id).is_none());
        assert!(f.search.get(id).unwrap().is_none());
        assert!(f.projection.get(id).is_none());
        assert!(f.projection.list().is_empty());
    }

    #[test]
    fn deleted_product_is_hidden_from_every_lookup() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        let event = created(id);
        apply(&f.projection, id, 1, &event);
        let ProductEvent::ProductCreated(c) = &event else { unreachable!() };
        let sku = c.variants[0].sku.clone();
        assert!(f.projection.by_sku(&sku).is_some());

        apply(
            &f.projection,
            id,
            2,
            &ProductEvent::ProductDeleted(ProductDeleted { product_id: id, occurred_at: Utc::now() }),
        );
        assert!(f.projection.get(id).is_none());
        assert!(f.projection.by_sku(&sku).is_none());
        assert!(f.cache.get(&id).is_none());
    }

    #[test]
    fn removed_variant_leaves_the_sku_index() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        let event = created(id);
        apply(&f.projection, id, 1, &event);
        let ProductEvent::ProductCreated(c) = &event else { unreachable!() };
        let sku = c.variants[1].sku.clone();

        apply(
            &f.projection,
            id,
            2,
            &ProductEvent::VariantRemoved(VariantRemoved { product_id: id, sku: sku.clone(), occurred_at: Utc::now() }),
        );
        assert!(f.projection.by_sku(&sku).is_none());
    }

    #[test]
    fn replayed_envelopes_are_ignored() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        let env = envelope(id.0, AGGREGATE_TYPE, 1, &created(id));
        f.projection.apply_envelope(&env).unwrap();
        f.projection.apply_envelope(&env).unwrap();
        assert_eq!(f.projection.list().len(), 1);
    }

    #[test]
    fn reset_forgets_everything() {
        let f = fixture();
        let id = ProductId::new(AggregateId::new());
        apply(&f.projection, id, 1, &created(id));
        f.projection.reset();
        assert!(f.projection.get(id).is_none());

        // Cursor reset: sequence 1 is accepted again.
        apply(&f.projection, id, 1, &created(id));
        assert!(f.projection.get(id).is_some());
    }
}
