//! Rebuilding read models from the event store.

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use super::{Projection, ProjectionError};
use crate::event_store::{EventStore, EventStoreError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection {projection} failed at event {event_id}: {source}")]
    Projection {
        projection: &'static str,
        event_id: String,
        #[source]
        source: ProjectionError,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub projection: &'static str,
    pub events: u64,
    pub elapsed_ms: u128,
}

/// Reset `projection` and feed it every event of the aggregate types it
/// consumes, in commit order.
pub fn rebuild<S>(store: &S, projection: &dyn Projection) -> Result<ReplayReport, ReplayError>
where
    S: EventStore + ?Sized,
{
    let started = Instant::now();
    projection.reset();

    let mut events = 0u64;
    for aggregate_type in projection.aggregate_types() {
        for stored in store.load_by_type(aggregate_type)? {
            let envelope = stored.to_envelope();
            projection.apply_envelope(&envelope).map_err(|source| ReplayError::Projection {
                projection: projection.name(),
                event_id: envelope.event_id().to_string(),
                source,
            })?;
            events += 1;
        }
    }

    let report = ReplayReport {
        projection: projection.name(),
        events,
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(projection = report.projection, events = report.events, elapsed_ms = report.elapsed_ms, "projection rebuilt");
    Ok(report)
}
