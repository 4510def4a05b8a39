//! `commerce-events`: event contracts shared by every service.
//!
//! - [`Event`]: what a domain event must expose.
//! - [`contract`]: the `"@type"`-tagged JSON form events travel in.
//! - [`EventEnvelope`]: stream metadata around a payload.
//! - [`EventBus`]: transport-agnostic pub/sub, with an in-memory implementation.

pub mod bus;
pub mod contract;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{AggregateScoped, EventBus, Subscription};
pub use contract::{ContractError, TYPE_TAG};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
