// SPDX-License-Identifier: Apache-2.0

/// Compile an item only when the `shuttle` feature is enabled for *this*
/// crate (not the crate importing the macro).
#[cfg(all(feature = "shuttle", not(feature = "silence_clippy")))]
#[macro_export]
macro_rules! with_shuttle {
    ($($item:item)*) => { $($item)* };
}

#[cfg(not(feature = "shuttle"))]
#[macro_export]
macro_rules! with_shuttle {
    ($($item:item)*) => {};
}

/// Compile an item only when the `loom` feature is enabled for *this* crate.
#[cfg(all(feature = "loom", not(feature = "silence_clippy")))]
#[macro_export]
macro_rules! with_loom {
    ($($item:item)*) => { $($item)* };
}

#[cfg(not(feature = "loom"))]
#[macro_export]
macro_rules! with_loom {
    ($($item:item)*) => {};
}

/// Compile an item only when neither `loom` nor `shuttle` is enabled.
#[cfg(not(any(feature = "loom", feature = "shuttle")))]
#[macro_export]
macro_rules! with_std {
    ($($item:item)*) => { $($item)* };
}

#[cfg(all(
    not(feature = "silence_clippy"),
    any(feature = "loom", feature = "shuttle")
))]
#[macro_export]
macro_rules! with_std {
    ($($item:item)*) => {};
}
