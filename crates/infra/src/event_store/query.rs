//! Read-only, paginated event inspection.

use serde::{Deserialize, Serialize};

use commerce_core::AggregateId;

use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    /// Events in the stream, across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl EventQueryResult {
    pub(crate) fn page(all: Vec<StoredEvent>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let events: Vec<StoredEvent> = all
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = u64::from(pagination.offset) + (events.len() as u64) < total;
        Self {
            events,
            total,
            pagination,
            has_more,
        }
    }
}

#[async_trait::async_trait]
pub trait EventQuery: Send + Sync {
    /// History of one aggregate in sequence order.
    async fn aggregate_events(
        &self,
        aggregate_id: AggregateId,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError>;
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn aggregate_events(
        &self,
        aggregate_id: AggregateId,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let stream = self.load_stream(aggregate_id)?;
        Ok(EventQueryResult::page(stream, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use commerce_core::{EventId, ExpectedVersion};
    use crate::event_store::UncommittedEvent;

    fn seed(store: &InMemoryEventStore, id: AggregateId, n: usize) {
        let events = (0..n)
            .map(|_| UncommittedEvent {
                event_id: EventId::new(),
                aggregate_id: id,
                aggregate_type: "t".to_string(),
                event_type: "t.happened".to_string(),
                event_version: 1,
                occurred_at: Utc::now(),
                payload: serde_json::json!({"@type": "Happened"}),
            })
            .collect();
        store.append(events, ExpectedVersion::Exact(0)).unwrap();
    }

    #[test]
    fn limit_is_defaulted_and_capped() {
        assert_eq!(Pagination::new(None, None).limit, DEFAULT_LIMIT);
        assert_eq!(Pagination::new(Some(5_000), None).limit, MAX_LIMIT);
        assert_eq!(Pagination::new(Some(0), Some(3)), Pagination { limit: 1, offset: 3 });
    }

    #[tokio::test]
    async fn pages_through_a_stream() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        seed(&store, id, 5);

        let first = store.aggregate_events(id, Pagination::new(Some(2), None)).await.unwrap();
        assert_eq!(first.total, 5);
        assert!(first.has_more);
        assert_eq!(first.events.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let last = store.aggregate_events(id, Pagination::new(Some(2), Some(4))).await.unwrap();
        assert_eq!(last.events.len(), 1);
        assert!(!last.has_more);
    }
}
