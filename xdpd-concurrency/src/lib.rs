// SPDX-License-Identifier: Apache-2.0

//! Swappable concurrency primitives.
//!
//! The datapath's hot-path synchronization (bufferpool, per-port queues, the
//! scheduler's running-hash barrier) is small enough to model exhaustively
//! with [loom](https://docs.rs/loom) or [shuttle](https://docs.rs/shuttle).
//! Production code always compiles against `std::sync` / `std::thread`;
//! enabling the `loom` or `shuttle` feature swaps every re-export below for
//! the matching deterministic-scheduling crate so the exact same source can
//! be exercised under exhaustive or randomized interleaving search.

#![cfg_attr(
    all(feature = "loom", feature = "shuttle"),
    doc = "compile_error disables both features at once"
)]

#[cfg(all(feature = "loom", feature = "shuttle"))]
compile_error!("features `loom` and `shuttle` are mutually exclusive");

mod macros;

pub use xdpd_concurrency_macros::concurrency_mode;

#[cfg(feature = "loom")]
pub use loom::sync;
#[cfg(feature = "loom")]
pub use loom::thread;

#[cfg(feature = "shuttle")]
pub use shuttle::sync;
#[cfg(feature = "shuttle")]
pub use shuttle::thread;

#[cfg(not(any(feature = "loom", feature = "shuttle")))]
pub use std::sync;
#[cfg(not(any(feature = "loom", feature = "shuttle")))]
pub use std::thread;
