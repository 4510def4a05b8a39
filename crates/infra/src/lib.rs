//! Infrastructure for the commerce services: event storage, command
//! dispatch, the bus, read models, caches and the adapters behind the
//! purchasing ports.

pub mod adapters;
pub mod cache;
pub mod command_dispatcher;
pub mod db;
pub mod event_bus;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;

#[cfg(test)]
mod integration_tests;
