//! MySQL-backed event store.
//!
//! One row per event in `events`; the unique key on
//! `(aggregate_id, sequence_number)` is the last line of defence for
//! optimistic concurrency, so a racing writer surfaces as
//! `EventStoreError::Concurrency` rather than a duplicate position.
//!
//! Identifiers are stored in their 26-character ULID text form.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, MySql, MySqlPool, Row, Transaction};
use tokio::runtime::Handle;
use tracing::instrument;

use commerce_core::{AggregateId, EventId, ExpectedVersion};

use super::query::{EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};
use crate::db;

#[derive(Debug, Clone)]
pub struct MySqlEventStore {
    pool: Arc<MySqlPool>,
    handle: Handle,
}

impl MySqlEventStore {
    /// Must be called from within a tokio runtime; the handle is kept for the
    /// synchronous [`EventStore`] methods.
    pub fn new(pool: MySqlPool) -> Result<Self, EventStoreError> {
        let handle = Handle::try_current()
            .map_err(|_| EventStoreError::Unavailable("MySqlEventStore requires a tokio runtime".to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
            handle,
        })
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn fetch_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = ?
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.to_string())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        decode_rows(&rows)
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_type = ?
            ORDER BY global_position ASC
            "#,
        )
        .bind(aggregate_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_by_type", e))?;

        decode_rows(&rows)
    }

    /// Version check and inserts share one transaction.
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = check_stream_version(&mut tx, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (event, sequence_number) in events.into_iter().zip(current_version + 1..) {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.event_id.to_string())
            .bind(aggregate_id.to_string())
            .bind(&aggregate_type)
            .bind(sequence_number as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {sequence_number} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }
}

impl EventStore for MySqlEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        db::block_on(&self.handle, self.append_events(events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        db::block_on(&self.handle, self.fetch_stream(aggregate_id))
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        db::block_on(&self.handle, self.fetch_by_type(aggregate_type))
    }
}

#[async_trait::async_trait]
impl EventQuery for MySqlEventStore {
    async fn aggregate_events(
        &self,
        aggregate_id: AggregateId,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let stream = self.fetch_stream(aggregate_id).await?;
        Ok(EventQueryResult::page(stream, pagination))
    }
}

/// `(current_version, aggregate_type)`; `(0, None)` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, MySql>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT MAX(sequence_number) AS current_version,
               MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = ?
        FOR UPDATE
        "#,
    )
    .bind(aggregate_id.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: Option<i64> = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version.unwrap_or(0) as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.is_unique_violation() {
                EventStoreError::Concurrency(msg)
            } else {
                EventStoreError::InvalidAppend(msg)
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            EventStoreError::Unavailable(format!("{operation}: {err}"))
        }
        other => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn decode_rows(rows: &[sqlx::mysql::MySqlRow]) -> Result<Vec<StoredEvent>, EventStoreError> {
    rows.iter()
        .map(|row| {
            StoredEventRow::from_row(row)
                .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read event row: {e}")))
                .and_then(StoredEvent::try_from)
        })
        .collect()
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: String,
    aggregate_id: String,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: JsonValue,
}

impl<'r> FromRow<'r, sqlx::mysql::MySqlRow> for StoredEventRow {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl TryFrom<StoredEventRow> for StoredEvent {
    type Error = EventStoreError;

    fn try_from(row: StoredEventRow) -> Result<Self, Self::Error> {
        let event_id: EventId = row
            .event_id
            .parse()
            .map_err(|e| EventStoreError::InvalidAppend(format!("stored event_id: {e}")))?;
        let aggregate_id: AggregateId = row
            .aggregate_id
            .parse()
            .map_err(|e| EventStoreError::InvalidAppend(format!("stored aggregate_id: {e}")))?;
        Ok(StoredEvent {
            event_id,
            aggregate_id,
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        })
    }
}
