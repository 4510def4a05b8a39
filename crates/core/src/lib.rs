//! `commerce-core`: shared kernel for the commerce services.
//!
//! Pure domain primitives only: aggregate traits, identifiers, money and the
//! domain error model. Nothing here performs IO.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, EventId};
pub use money::{DEFAULT_CURRENCY, Money};
pub use value_object::ValueObject;
