//! Append-only event store boundary and its backends.

pub mod in_memory;
pub mod mysql;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use mysql::MySqlEventStore;
pub use query::{EventQuery, EventQueryResult, Pagination};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
