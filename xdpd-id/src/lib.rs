// SPDX-License-Identifier: Apache-2.0

//! A "typed" UUID.
//!
//! [`Id<T>`] wraps a [`Uuid`] with a zero-size, compile-time tag so that ids
//! belonging to different entities (ports, tables, groups, pipeline stages)
//! cannot be silently swapped.

use core::fmt::{Debug, Formatter};
use std::borrow::Borrow;
use std::fmt::Display;
use std::marker::PhantomData;
use uuid::Uuid;

/// A typed UUID tagged with the type of thing it identifies.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id<T>(Uuid, PhantomData<fn() -> T>);

impl<T> AsRef<Uuid> for Id<T> {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.0.as_hyphenated(), f)
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self.0.as_hyphenated(), f)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Id<T> {
    /// Namespace UUID used to generate namespaced UUIDv5 identifiers.
    pub const NAMESPACE_UUID: Uuid = Uuid::from_u128(0x8178_d539_96b8_40fd_8fbf_402503aa204a);

    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Id<T> {
        Id(Uuid::new_v4(), PhantomData)
    }

    /// Strip type safety and return the wrapped, untyped [`Uuid`].
    #[must_use]
    pub const fn into_raw(self) -> Uuid {
        self.0
    }

    #[must_use]
    pub const fn as_raw(&self) -> &Uuid {
        &self.0
    }

    /// Tag an existing [`Uuid`] with this id's type.
    #[must_use]
    pub const fn from_raw(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Deterministic id derived from `name`, stable across runs.
    pub fn new_v5<N: Borrow<[u8]>>(namespace: Uuid, name: N) -> Self {
        Self(Uuid::new_v5(&namespace, name.borrow()), PhantomData)
    }

    /// Deterministic id derived from a string tag under this crate's namespace.
    pub fn new_static(tag: &str) -> Self {
        Self::new_v5(Self::NAMESPACE_UUID, tag.as_bytes())
    }
}

impl<T> From<Id<T>> for Uuid {
    fn from(value: Id<T>) -> Self {
        value.0
    }
}

impl<T> From<Uuid> for Id<T> {
    fn from(value: Uuid) -> Self {
        Self::from_raw(value)
    }
}

#[cfg(test)]
mod test {
    use crate::Id;
    use uuid::Uuid;

    #[test]
    fn round_trips_through_raw() {
        let id = Id::<()>::new();
        assert_eq!(id, Id::from_raw(id.into_raw()));
    }

    #[test]
    fn new_generates_unique_ids() {
        let a = Id::<()>::new();
        let b = Id::<()>::new();
        assert_ne!(a, b);
    }

    #[test]
    fn v5_matches_reference_uuid() {
        let namespace = Uuid::new_v4();
        let raw = Id::<()>::new_v5(namespace, b"table-7".as_slice()).into_raw();
        let reference = Uuid::new_v5(&namespace, b"table-7");
        assert_eq!(raw, reference);
    }

    #[test]
    fn static_id_is_stable_across_calls() {
        let a = Id::<()>::new_static("flow-table-0");
        let b = Id::<()>::new_static("flow-table-0");
        assert_eq!(a, b);
        let c = Id::<()>::new_static("flow-table-1");
        assert_ne!(a, c);
    }
}
