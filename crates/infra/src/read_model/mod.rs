//! Disposable key/value storage for read models.

pub mod mysql;
pub mod store;

pub use mysql::MySqlReadStore;
pub use store::{InMemoryReadStore, ReadStore};
