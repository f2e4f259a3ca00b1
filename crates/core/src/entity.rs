//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Used for records owned by an aggregate (e.g. voucher details) that need a
/// stable identity of their own but are never loaded independently.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
