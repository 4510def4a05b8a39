use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use commerce_products::ProductId;
use commerce_search::ProductDocument;

pub const DEFAULT_PRODUCT_TTL: Duration = Duration::from_secs(10 * 60);

/// Product lookups by id, with expiry.
pub trait ProductCache: Send + Sync {
    fn get(&self, id: &ProductId) -> Option<ProductDocument>;

    fn put(&self, doc: ProductDocument);

    /// Refresh an entry only if it is currently cached.
    fn put_if_present(&self, doc: ProductDocument);

    fn evict(&self, id: &ProductId);
}

impl<C> ProductCache for Arc<C>
where
    C: ProductCache + ?Sized,
{
    fn get(&self, id: &ProductId) -> Option<ProductDocument> {
        (**self).get(id)
    }

    fn put(&self, doc: ProductDocument) {
        (**self).put(doc)
    }

    fn put_if_present(&self, doc: ProductDocument) {
        (**self).put_if_present(doc)
    }

    fn evict(&self, id: &ProductId) {
        (**self).evict(id)
    }
}

#[derive(Debug)]
pub struct InMemoryProductCache {
    ttl: Duration,
    entries: RwLock<HashMap<ProductId, (Instant, ProductDocument)>>,
}

impl InMemoryProductCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryProductCache {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT_TTL)
    }
}

impl ProductCache for InMemoryProductCache {
    fn get(&self, id: &ProductId) -> Option<ProductDocument> {
        let entries = self.entries.read().ok()?;
        match entries.get(id) {
            Some((expires_at, doc)) if *expires_at > Instant::now() => Some(doc.clone()),
            _ => None,
        }
    }

    fn put(&self, doc: ProductDocument) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(doc.id, (Instant::now() + self.ttl, doc));
        }
    }

    fn put_if_present(&self, doc: ProductDocument) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            if let Some(entry) = entries.get_mut(&doc.id) {
                if entry.0 > now {
                    *entry = (now + self.ttl, doc);
                }
            }
        }
    }

    fn evict(&self, id: &ProductId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use chrono::Utc;
    use commerce_core::{AggregateId, Money};
    use commerce_products::{ProductStatus, SellerId};

    fn doc(name: &str) -> ProductDocument {
        ProductDocument {
            id: ProductId::new(AggregateId::new()),
            seller_id: SellerId::new("seller-1"),
            name: name.to_string(),
            brand: "Acme".to_string(),
            description: String::new(),
            base_price: Money::krw(1_000),
            category_id: "shoes".to_string(),
            status: ProductStatus::Active,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            attributes: BTreeSet::new(),
            suggestions: vec![],
            variants: vec![],
        }
    }

    #[test]
    fn put_get_evict() {
        let cache = InMemoryProductCache::default();
        let d = doc("Runner");
        cache.put(d.clone());
        assert_eq!(cache.get(&d.id), Some(d.clone()));

        cache.evict(&d.id);
        assert_eq!(cache.get(&d.id), None);
    }

    #[test]
    fn put_if_present_does_not_populate() {
        let cache = InMemoryProductCache::default();
        let d = doc("Runner");
        cache.put_if_present(d.clone());
        assert_eq!(cache.get(&d.id), None);

        cache.put(d.clone());
        let renamed = ProductDocument { name: "Trail Runner".to_string(), ..d.clone() };
        cache.put_if_present(renamed);
        assert_eq!(cache.get(&d.id).map(|x| x.name), Some("Trail Runner".to_string()));
    }

    #[test]
    fn entries_expire() {
        let cache = InMemoryProductCache::new(Duration::ZERO);
        let d = doc("Runner");
        cache.put(d.clone());
        assert_eq!(cache.get(&d.id), None);
    }
}
