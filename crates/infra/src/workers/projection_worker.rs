use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::warn;

use commerce_events::{AggregateScoped, EventBus, EventEnvelope, Subscription};

use crate::projections::Projection;

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Bus consumer on its own thread.
///
/// The subscription is taken before `spawn` returns, so nothing published
/// afterwards is missed. Handlers must be idempotent: delivery is
/// at-least-once.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// `aggregate_types`: messages of other aggregate types are skipped;
    /// empty means everything.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        aggregate_types: &'static [&'static str],
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: AggregateScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, aggregate_types, &mut handler))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Feed a projection from the bus.
    pub fn spawn_projection<B, P>(bus: &B, projection: P) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>> + ?Sized,
        P: Projection + 'static,
    {
        let name = projection.name();
        let types = projection.aggregate_types();
        Self::spawn(name, bus, types, move |env: EventEnvelope<JsonValue>| projection.apply_envelope(&env))
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    aggregate_types: &[&str],
    handler: &mut H,
) where
    M: AggregateScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if !aggregate_types.is_empty() && !aggregate_types.contains(&msg.aggregate_type()) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(worker = name, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use chrono::Utc;
    use commerce_core::{AggregateId, EventId};
    use commerce_events::InMemoryEventBus;
    use serde_json::json;

    use super::*;

    fn env(aggregate_type: &str) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(EventId::new(), AggregateId::new(), aggregate_type, "t", Utc::now(), 1, json!({}))
    }

    #[test]
    fn filters_by_aggregate_type_and_stops_on_shutdown() {
        let bus = InMemoryEventBus::<EventEnvelope<JsonValue>>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = ProjectionWorker::spawn("test", &bus, &["stock.stock"], move |m: EventEnvelope<JsonValue>| {
            sink.lock().unwrap().push(m.aggregate_type().to_string());
            Ok::<(), String>(())
        })
        .unwrap();

        bus.publish(env("products.product")).unwrap();
        bus.publish(env("stock.stock")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec!["stock.stock".to_string()]);
    }

    #[test]
    fn handler_errors_do_not_stop_the_worker() {
        let bus = InMemoryEventBus::<EventEnvelope<JsonValue>>::new();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();

        let handle = ProjectionWorker::spawn("failing", &bus, &[], move |_m: EventEnvelope<JsonValue>| {
            *sink.lock().unwrap() += 1;
            Err::<(), String>("boom".to_string())
        })
        .unwrap();

        bus.publish(env("a")).unwrap();
        bus.publish(env("b")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while *count.lock().unwrap() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
