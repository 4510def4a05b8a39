//! Event bus transports for committed envelopes.
//!
//! The bus contract lives in `commerce-events`. This module adds a
//! type-erased handle so the binary can choose a transport at runtime, and
//! the Redis pub/sub transport behind the `redis` feature.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use commerce_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};

pub type JsonEnvelope = EventEnvelope<JsonValue>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("event bus publish failed: {0}")]
pub struct BusError(pub String);

/// Object-safe view of an `EventBus<JsonEnvelope>`.
pub trait ErasedBus: Send + Sync {
    fn publish_envelope(&self, envelope: JsonEnvelope) -> Result<(), BusError>;

    fn subscribe_envelopes(&self) -> Subscription<JsonEnvelope>;
}

impl<B> ErasedBus for B
where
    B: EventBus<JsonEnvelope>,
{
    fn publish_envelope(&self, envelope: JsonEnvelope) -> Result<(), BusError> {
        self.publish(envelope).map_err(|e| BusError(format!("{e:?}")))
    }

    fn subscribe_envelopes(&self) -> Subscription<JsonEnvelope> {
        self.subscribe()
    }
}

/// Cloneable handle over whichever transport was configured.
#[derive(Clone)]
pub struct SharedBus(Arc<dyn ErasedBus>);

impl SharedBus {
    pub fn new<B>(bus: B) -> Self
    where
        B: EventBus<JsonEnvelope> + 'static,
    {
        Self(Arc::new(bus))
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryEventBus::<JsonEnvelope>::new())
    }
}

impl core::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedBus")
    }
}

impl EventBus<JsonEnvelope> for SharedBus {
    type Error = BusError;

    fn publish(&self, message: JsonEnvelope) -> Result<(), Self::Error> {
        self.0.publish_envelope(message)
    }

    fn subscribe(&self) -> Subscription<JsonEnvelope> {
        self.0.subscribe_envelopes()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use commerce_core::{AggregateId, EventId};
    use serde_json::json;

    use super::*;

    #[test]
    fn shared_bus_fans_out_to_every_subscriber() {
        let bus = SharedBus::in_memory();
        let a = bus.subscribe();
        let b = bus.clone().subscribe();

        let envelope = EventEnvelope::new(
            EventId::new(),
            AggregateId::new(),
            "stock.stock",
            "stock.stock.registered",
            Utc::now(),
            1,
            json!({"@type": "StockRegistered"}),
        );
        bus.publish(envelope.clone()).unwrap();

        assert_eq!(a.try_recv().unwrap(), envelope);
        assert_eq!(b.try_recv().unwrap(), envelope);
    }
}
