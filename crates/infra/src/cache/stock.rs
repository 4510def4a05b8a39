use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use commerce_stock::StockId;

/// Outcome of [`StockCache::try_decrement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// Taken; carries the remaining quantity.
    Taken(i64),
    /// Would go negative; the cached value is unchanged.
    Insufficient { available: i64 },
    /// Nothing cached for this stock.
    Missing,
}

/// Hot stock quantities keyed by stock id.
pub trait StockCache: Send + Sync {
    fn get(&self, id: &StockId) -> Option<i64>;

    fn set(&self, id: &StockId, quantity: i64);

    /// Atomically subtract `quantity` unless the result would be negative.
    fn try_decrement(&self, id: &StockId, quantity: i64) -> Decrement;

    /// Add back `quantity`; returns the new value when the entry exists.
    fn increment(&self, id: &StockId, quantity: i64) -> Option<i64>;

    fn evict(&self, id: &StockId);
}

impl<C> StockCache for Arc<C>
where
    C: StockCache + ?Sized,
{
    fn get(&self, id: &StockId) -> Option<i64> {
        (**self).get(id)
    }

    fn set(&self, id: &StockId, quantity: i64) {
        (**self).set(id, quantity)
    }

    fn try_decrement(&self, id: &StockId, quantity: i64) -> Decrement {
        (**self).try_decrement(id, quantity)
    }

    fn increment(&self, id: &StockId, quantity: i64) -> Option<i64> {
        (**self).increment(id, quantity)
    }

    fn evict(&self, id: &StockId) {
        (**self).evict(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStockCache {
    quantities: Mutex<HashMap<StockId, i64>>,
}

impl InMemoryStockCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockCache for InMemoryStockCache {
    fn get(&self, id: &StockId) -> Option<i64> {
        self.quantities.lock().ok()?.get(id).copied()
    }

    fn set(&self, id: &StockId, quantity: i64) {
        if let Ok(mut map) = self.quantities.lock() {
            map.insert(*id, quantity);
        }
    }

    fn try_decrement(&self, id: &StockId, quantity: i64) -> Decrement {
        let Ok(mut map) = self.quantities.lock() else {
            return Decrement::Missing;
        };
        match map.get_mut(id) {
            None => Decrement::Missing,
            Some(current) if *current < quantity => Decrement::Insufficient { available: *current },
            Some(current) => {
                *current -= quantity;
                Decrement::Taken(*current)
            }
        }
    }

    fn increment(&self, id: &StockId, quantity: i64) -> Option<i64> {
        let mut map = self.quantities.lock().ok()?;
        let current = map.get_mut(id)?;
        *current = current.saturating_add(quantity);
        Some(*current)
    }

    fn evict(&self, id: &StockId) {
        if let Ok(mut map) = self.quantities.lock() {
            map.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_core::AggregateId;

    #[test]
    fn decrement_never_goes_negative() {
        let cache = InMemoryStockCache::new();
        let id = StockId::new(AggregateId::new());
        cache.set(&id, 5);

        assert_eq!(cache.try_decrement(&id, 3), Decrement::Taken(2));
        assert_eq!(cache.try_decrement(&id, 3), Decrement::Insufficient { available: 2 });
        assert_eq!(cache.get(&id), Some(2));
        assert_eq!(cache.try_decrement(&id, 2), Decrement::Taken(0));
    }

    #[test]
    fn missing_entries_are_reported() {
        let cache = InMemoryStockCache::new();
        let id = StockId::new(AggregateId::new());
        assert_eq!(cache.try_decrement(&id, 1), Decrement::Missing);
        assert_eq!(cache.increment(&id, 1), None);
        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn increment_restores() {
        let cache = InMemoryStockCache::new();
        let id = StockId::new(AggregateId::new());
        cache.set(&id, 1);
        assert_eq!(cache.try_decrement(&id, 1), Decrement::Taken(0));
        assert_eq!(cache.increment(&id, 1), Some(1));
        cache.evict(&id);
        assert_eq!(cache.get(&id), None);
    }

    #[test]
    fn concurrent_decrements_never_oversell() {
        let cache = Arc::new(InMemoryStockCache::new());
        let id = StockId::new(AggregateId::new());
        cache.set(&id, 50);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| matches!(cache.try_decrement(&id, 1), Decrement::Taken(_))).count()
                })
            })
            .collect();
        let taken: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(taken, 50);
        assert_eq!(cache.get(&id), Some(0));
    }
}
