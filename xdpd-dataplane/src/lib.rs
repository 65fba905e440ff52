// SPDX-License-Identifier: Apache-2.0

//! The packet I/O and pipeline dispatch core of the datapath: port
//! scheduling across cores, the per-core poll loop, the action executor,
//! and the process-wide runtime tying them together.

pub mod buffer_store;
pub mod executor;
pub mod header_edit;
pub mod packet_out;
pub mod ports;
pub mod runtime;
pub mod scheduler;
pub mod worker;
