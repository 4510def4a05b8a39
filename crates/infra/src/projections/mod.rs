//! Read model builders.
//!
//! Every projection is:
//! - idempotent: an event at or below the stream's cursor is skipped
//! - gap-intolerant: an event that skips ahead is rejected
//! - rebuildable: `reset` plus a replay of the event store restores it
//!
//! Projections fold each stream into its domain aggregate and derive their
//! views from that state, so read models never re-implement domain rules.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use commerce_core::{Aggregate, AggregateId};
use commerce_events::{EventEnvelope, contract};

pub mod carts;
pub mod catalog;
pub mod orders;
pub mod replay;
pub mod reviews;
pub mod stock_levels;

pub use carts::{CartView, CartsProjection};
pub use catalog::ProductCatalogProjection;
pub use orders::{OrderView, OrdersProjection};
pub use replay::{ReplayError, ReplayReport, rebuild};
pub use reviews::{ProductReviewCount, ReviewPage, ReviewView, ReviewsProjection};
pub use stock_levels::{StockLevelsProjection, StockView};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to decode event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection state lock poisoned")]
    Poisoned,
}

/// A read model fed from the bus.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Streams this projection consumes.
    fn aggregate_types(&self) -> &'static [&'static str];

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Forget everything, including cursors.
    fn reset(&self);
}

impl<P> Projection for Arc<P>
where
    P: Projection + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        (**self).aggregate_types()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        (**self).apply_envelope(envelope)
    }

    fn reset(&self) {
        (**self).reset()
    }
}

/// Per-stream aggregate state. The aggregate's version is the stream cursor.
pub struct StreamFold<A> {
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    states: RwLock<HashMap<AggregateId, A>>,
}

impl<A> StreamFold<A>
where
    A: Aggregate + Clone,
    A::Event: DeserializeOwned,
{
    pub fn new(aggregate_type: &'static str, make: fn(AggregateId) -> A) -> Self {
        Self {
            aggregate_type,
            make,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Apply the envelope if it is the next event of its stream.
    ///
    /// `Ok(None)` means nothing to do: another aggregate type, or an event
    /// already applied.
    pub fn fold(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Option<(A::Event, A)>, ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(None);
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let mut states = self.states.write().map_err(|_| ProjectionError::Poisoned)?;
        let state = states.entry(aggregate_id).or_insert_with(|| (self.make)(aggregate_id));

        let last = state.version();
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(None);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: A::Event =
            contract::decode(envelope.payload()).map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        state.apply(&event);
        Ok(Some((event, state.clone())))
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<A> {
        self.states.read().ok()?.get(&aggregate_id).cloned()
    }

    pub fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.get(aggregate_id).map(|a| a.version()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut states) = self.states.write() {
            states.clear();
        }
    }
}

impl<A> core::fmt::Debug for StreamFold<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let streams = self.states.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("StreamFold")
            .field("aggregate_type", &self.aggregate_type)
            .field("streams", &streams)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::envelope;
    use super::*;
    use chrono::Utc;
    use commerce_core::AggregateRoot;
    use commerce_stock::{AGGREGATE_TYPE, Stock, StockEvent, StockId, StockIncreased, StockRegistered};

    fn registered(id: StockId) -> StockEvent {
        StockEvent::StockRegistered(StockRegistered {
            stock_id: id,
            sku: "SKU".to_string(),
            quantity: 1,
            occurred_at: Utc::now(),
        })
    }

    fn increased(id: StockId, after: i64) -> StockEvent {
        StockEvent::StockIncreased(StockIncreased {
            stock_id: id,
            quantity: 1,
            quantity_after: after,
            occurred_at: Utc::now(),
        })
    }

    fn fold() -> StreamFold<Stock> {
        StreamFold::new(AGGREGATE_TYPE, |a| Stock::empty(StockId::new(a)))
    }

    #[test]
    fn duplicates_are_skipped() {
        let fold = fold();
        let id = StockId::new(AggregateId::new());
        let first = envelope(id.0, AGGREGATE_TYPE, 1, &registered(id));

        assert!(fold.fold(&first).unwrap().is_some());
        assert!(fold.fold(&first).unwrap().is_none());
        assert_eq!(fold.cursor(id.0), 1);
    }

    #[test]
    fn gaps_are_rejected() {
        let fold = fold();
        let id = StockId::new(AggregateId::new());
        fold.fold(&envelope(id.0, AGGREGATE_TYPE, 1, &registered(id))).unwrap();

        let err = fold.fold(&envelope(id.0, AGGREGATE_TYPE, 3, &increased(id, 3))).unwrap_err();
        assert_eq!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 });

        let (_, state) = fold
            .fold(&envelope(id.0, AGGREGATE_TYPE, 2, &increased(id, 2)))
            .unwrap()
            .unwrap();
        assert_eq!(state.quantity(), 2);
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn other_aggregate_types_are_ignored() {
        let fold = fold();
        let id = StockId::new(AggregateId::new());
        assert!(fold.fold(&envelope(id.0, "products.product", 1, &registered(id))).unwrap().is_none());
        assert_eq!(fold.cursor(id.0), 0);
    }

    #[test]
    fn clear_resets_cursors() {
        let fold = fold();
        let id = StockId::new(AggregateId::new());
        fold.fold(&envelope(id.0, AGGREGATE_TYPE, 1, &registered(id))).unwrap();
        fold.clear();
        assert_eq!(fold.cursor(id.0), 0);
        assert!(fold.get(id.0).is_none());
    }
}
