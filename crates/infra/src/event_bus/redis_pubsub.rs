//! Redis pub/sub transport.
//!
//! Pub/sub is not durable: a subscriber that is offline misses messages.
//! Projections recover by rebuilding from the event store at startup.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;

use commerce_events::{EventBus, EventEnvelope, Subscription};

use super::JsonEnvelope;

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("envelope serialization failed: {0}")]
    Serialize(#[from] commerce_serializer::SerializerError),
}

#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        Ok(Self {
            client: redis::Client::open(redis_url.as_ref())?,
            channel: channel.into(),
        })
    }
}

impl EventBus<JsonEnvelope> for RedisPubSubEventBus {
    type Error = RedisBusError;

    fn publish(&self, message: JsonEnvelope) -> Result<(), Self::Error> {
        let payload = commerce_serializer::to_json(&message)?;
        let mut conn = self.client.get_connection()?;
        let _: i64 = conn.publish(&self.channel, payload)?;
        Ok(())
    }

    fn subscribe(&self) -> Subscription<JsonEnvelope> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let channel = self.channel.clone();

        let spawned = thread::Builder::new()
            .name(format!("redis-sub-{channel}"))
            .spawn(move || {
                let mut conn = match client.get_connection() {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "redis subscription failed to connect");
                        return;
                    }
                };
                let mut pubsub = conn.as_pubsub();
                if let Err(e) = pubsub.subscribe(&channel) {
                    tracing::warn!(channel = %channel, error = %e, "redis subscribe failed");
                    return;
                }

                loop {
                    let msg = match pubsub.get_message() {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "redis subscription closed");
                            return;
                        }
                    };
                    let Ok(payload) = msg.get_payload::<String>() else { continue };
                    let envelope: EventEnvelope<_> = match commerce_serializer::from_json(&payload) {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "dropping undecodable envelope");
                            continue;
                        }
                    };
                    if tx.send(envelope).is_err() {
                        return;
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start redis subscriber thread");
        }

        Subscription::new(rx)
    }
}
