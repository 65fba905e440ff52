// SPDX-License-Identifier: Apache-2.0

//! Wire formats, the packet buffer abstraction, and the packet descriptor
//! that flows through the pipeline.
//!
//! This crate owns everything below the pipeline dispatcher: parsing a raw
//! frame into a [`Headers`] stack, the [`buffer`] trait family that lets the
//! same descriptor code run over a pool-owned byte array or a zero-copy ring
//! slot, and [`packet::Packet`], the heap-stable handle that owns exactly one
//! frame as it moves through RX, the pipeline, and TX.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod arp;
pub mod buffer;
pub mod checksum;
pub mod classifier;
pub mod eth;
pub mod headers;
pub mod icmp;
pub mod ip;
pub mod mpls;
pub mod packet;
pub mod sctp;
pub mod tcp;
pub mod udp;
pub mod vlan;

pub use classifier::{ChecksumLayer, ClassifierState, L3Protocol, L4Protocol, ProtocolStack};
pub use headers::Headers;
pub use packet::Packet;
