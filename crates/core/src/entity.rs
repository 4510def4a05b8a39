//! Entities: objects owned by an aggregate that keep identity across changes
//! (cart items, order lines, product variants).

pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
