//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! command
//!   -> load stream -> rehydrate -> handle (pure) -> append (optimistic) -> publish
//! ```
//!
//! Events are published only after the append succeeded. A publish failure
//! is reported to the caller but the events stay committed, so delivery is
//! at-least-once and consumers must be idempotent.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use commerce_core::{Aggregate, AggregateId, DomainError, EventId, ExpectedVersion};
use commerce_events::{EventBus, EventEnvelope, contract};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version or duplicate creation.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Coded business rule, e.g. `CART_002`.
    #[error("{code}: {message}")]
    Rule { code: String, message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Append succeeded, publication did not.
    #[error("publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Rule { code, message } => DispatchError::Rule { code, message },
        }
    }
}

/// Runs commands against any aggregate over an [`EventStore`] and an
/// [`EventBus`] of JSON envelopes.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Handle `command` against the current state of `aggregate_id` and
    /// commit the resulting events.
    ///
    /// Returns the committed events; empty when the command decided nothing.
    /// A concurrent writer surfaces as [`DispatchError::Concurrency`]; the
    /// caller may reload and retry.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: commerce_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_at(aggregate_id, aggregate_type, command, ExpectedVersion::Any, make_aggregate)
    }

    /// Like [`dispatch`](Self::dispatch), but only if the stream is still at
    /// `version`. Use when the command was built from state loaded earlier.
    pub fn dispatch_at<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        version: ExpectedVersion,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: commerce_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let current = stream_version(&history);
        version.check(current)?;
        let expected = ExpectedVersion::Exact(current);

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, EventId::new(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        tracing::debug!(
            aggregate_type,
            aggregate_id = %aggregate_id,
            events = committed.len(),
            "events committed"
        );

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate without handling anything. A never-created aggregate comes
    /// back in its empty state.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// A backend returning another stream's events or an unordered stream is a
/// store fault, not a domain one.
fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event =
            contract::decode(&stored.payload).map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use commerce_core::AggregateRoot;
    use commerce_events::InMemoryEventBus;
    use commerce_stock::{
        AGGREGATE_TYPE, DecreaseStock, IncreaseStock, RegisterStock, Stock, StockCommand, StockId,
    };

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn dispatcher() -> (CommandDispatcher<Arc<InMemoryEventStore>, Bus>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        (CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus.clone()), bus)
    }

    fn register(id: StockId, quantity: i64) -> StockCommand {
        StockCommand::Register(RegisterStock {
            stock_id: id,
            sku: "SKU-1".to_string(),
            quantity,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_commits_and_publishes_in_order() {
        let (d, bus) = dispatcher();
        let sub = bus.subscribe();
        let id = StockId::new(AggregateId::new());

        d.dispatch(id.0, AGGREGATE_TYPE, register(id, 5), |a| Stock::empty(StockId::new(a)))
            .unwrap();
        let committed = d
            .dispatch(
                id.0,
                AGGREGATE_TYPE,
                StockCommand::Increase(IncreaseStock { stock_id: id, quantity: 2, occurred_at: Utc::now() }),
                |a| Stock::empty(StockId::new(a)),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);

        let first = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        let second = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(first.sequence_number(), 1);
        assert_eq!(second.event_type(), "stock.stock.increased");
        assert_eq!(contract::type_of(second.payload()), Some("StockIncreased"));

        let stock: Stock = d.load(id.0, |a| Stock::empty(StockId::new(a))).unwrap();
        assert_eq!(stock.quantity(), 7);
        assert_eq!(stock.version(), 2);
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let (d, _bus) = dispatcher();
        let id = StockId::new(AggregateId::new());
        d.dispatch(id.0, AGGREGATE_TYPE, register(id, 5), |a| Stock::empty(StockId::new(a)))
            .unwrap();

        let increase = || StockCommand::Increase(IncreaseStock { stock_id: id, quantity: 1, occurred_at: Utc::now() });
        let err = d
            .dispatch_at(id.0, AGGREGATE_TYPE, increase(), ExpectedVersion::Exact(0), |a| {
                Stock::empty(StockId::new(a))
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)), "got {err:?}");

        let committed = d
            .dispatch_at(id.0, AGGREGATE_TYPE, increase(), ExpectedVersion::Exact(1), |a| {
                Stock::empty(StockId::new(a))
            })
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);
    }

    #[test]
    fn domain_errors_are_classified() {
        let (d, _bus) = dispatcher();
        let id = StockId::new(AggregateId::new());

        let err = d
            .dispatch(
                id.0,
                AGGREGATE_TYPE,
                StockCommand::Decrease(DecreaseStock { stock_id: id, quantity: 1, occurred_at: Utc::now() }),
                |a| Stock::empty(StockId::new(a)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        d.dispatch(id.0, AGGREGATE_TYPE, register(id, 1), |a| Stock::empty(StockId::new(a)))
            .unwrap();
        let dup = d
            .dispatch(id.0, AGGREGATE_TYPE, register(id, 1), |a| Stock::empty(StockId::new(a)))
            .unwrap_err();
        assert!(matches!(dup, DispatchError::Concurrency(_)));

        let too_many = d
            .dispatch(
                id.0,
                AGGREGATE_TYPE,
                StockCommand::Decrease(DecreaseStock { stock_id: id, quantity: 9, occurred_at: Utc::now() }),
                |a| Stock::empty(StockId::new(a)),
            )
            .unwrap_err();
        assert!(matches!(too_many, DispatchError::InvariantViolation(_)));
    }

    #[test]
    fn rule_errors_keep_their_code() {
        let err = DispatchError::from(DomainError::rule("CART_004", "Invalid quantity"));
        match err {
            DispatchError::Rule { code, .. } => assert_eq!(code, "CART_004"),
            other => panic!("Expected rule error, got {other:?}"),
        }
    }

    #[test]
    fn loading_an_unknown_aggregate_yields_the_empty_state() {
        let (d, _bus) = dispatcher();
        let id = AggregateId::new();
        let stock: Stock = d.load(id, |a| Stock::empty(StockId::new(a))).unwrap();
        assert_eq!(stock.version(), 0);
    }
}
