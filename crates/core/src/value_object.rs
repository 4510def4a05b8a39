//! Value objects: immutable, compared by value, no identity.

/// Marker for value objects such as [`Money`](crate::Money) or option maps.
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
