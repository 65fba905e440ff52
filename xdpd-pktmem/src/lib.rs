// SPDX-License-Identifier: Apache-2.0

//! The L1 buffer pool (§4.1): a fixed-capacity slab of preallocated byte
//! buffers, handed out and reclaimed without touching the system allocator
//! on the hot path.
//!
//! This is the safe, user-space counterpart to a DPDK `rte_mempool`: no
//! FFI, no raw pointers, just a bounded free-list of `Vec<u8>` slabs and a
//! RAII handle that returns its slab to the list on drop.

mod pool;

pub use pool::{InvalidPoolConfig, Pool, PoolBuffer, PoolConfig, PoolParams};
