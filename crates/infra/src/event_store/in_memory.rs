use std::collections::HashMap;
use std::sync::RwLock;

use commerce_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Commit order across streams.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events across all streams.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let stream = inner.streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        stream.extend(committed.iter().cloned());
        inner.log.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(inner
            .log
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use commerce_core::EventId;
    use serde_json::json;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: EventId::new(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.thing.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({"@type": "Happened"}),
        }
    }

    #[test]
    fn assigns_contiguous_sequence_numbers_per_stream() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let first = store
            .append(vec![event(a, "t"), event(a, "t")], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        store.append(vec![event(b, "t")], ExpectedVersion::Exact(0)).unwrap();
        let next = store.append(vec![event(a, "t")], ExpectedVersion::Exact(2)).unwrap();
        assert_eq!(next[0].sequence_number, 3);

        assert_eq!(store.load_stream(a).unwrap().len(), 3);
        assert_eq!(store.load_stream(b).unwrap().len(), 1);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "t")], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(a, "t")], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(a).unwrap().len(), 1);
    }

    #[test]
    fn aggregate_type_of_a_stream_is_stable() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "t")], ExpectedVersion::Any).unwrap();

        let err = store.append(vec![event(a, "other")], ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(vec![event(AggregateId::new(), "t"), event(AggregateId::new(), "t")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn load_by_type_keeps_commit_order() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.append(vec![event(a, "t")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(b, "u")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(b, "u")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(a, "t")], ExpectedVersion::Any).unwrap();

        let ts = store.load_by_type("t").unwrap();
        assert_eq!(ts.len(), 2);
        assert!(ts.iter().all(|e| e.aggregate_id == a));
        assert_eq!(store.load_by_type("u").unwrap().len(), 2);
        assert!(store.load_by_type("none").unwrap().is_empty());
    }
}
