use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Events are immutable, versioned and append-only.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"purchasing.cart.item_added"`.
    fn event_type(&self) -> &'static str;

    /// Schema version of this event type.
    fn version(&self) -> u32;

    /// Business time at which the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
