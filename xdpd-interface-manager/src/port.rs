// SPDX-License-Identifier: Apache-2.0

//! The switch port model and the `NicPort` contract every port kind
//! implements (§3 "Switch port", §4.2 "Port I/O driver").

use std::num::NonZero;
use std::time::Duration;

use xdpd_net::buffer::PacketBufferMut;
use xdpd_net::eth::Mac;
use xdpd_net::packet::Packet;

/// A Linux ifindex, never zero.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IfIndex(NonZero<u32>);

#[derive(Debug, thiserror::Error)]
#[error("zero is not a legal network interface index")]
pub struct ZeroIfIndex;

impl IfIndex {
    pub fn try_new(raw: u32) -> Result<Self, ZeroIfIndex> {
        Ok(IfIndex(NonZero::new(raw).ok_or(ZeroIfIndex)?))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// The dense, in-switch port number used by flow match/action fields.
/// `OFPP_FLOOD`/`OFPP_ALL`/`OFPP_CONTROLLER`/`OFPP_IN_PORT` are reserved
/// meta-port values, not assignable to a real port.
pub mod meta_port {
    pub const FLOOD: u32 = 0xffff_fffb;
    pub const ALL: u32 = 0xffff_fffc;
    pub const CONTROLLER: u32 = 0xffff_fffd;
    pub const IN_PORT: u32 = 0xffff_fff8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Detected,
    NotDetected,
}

bitflags::bitflags! {
    /// Per-port behavior flags (§3 "Switch port").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortConfigFlags: u32 {
        const DROP_RECEIVED      = 0b0001;
        const NO_FLOOD           = 0b0010;
        const FORWARD_PACKETS    = 0b0100;
        const GENERATE_PACKET_IN = 0b1000;
    }
}

/// Per-port output queue: bounded, single-consumer (the owning core's TX),
/// multi-producer (any core's action executor).
#[derive(Debug)]
pub struct PortQueue<Buf: PacketBufferMut> {
    pending: std::collections::VecDeque<Packet<Buf>>,
    capacity: usize,
    overrun: u64,
}

impl<Buf: PacketBufferMut> PortQueue<Buf> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        PortQueue {
            pending: std::collections::VecDeque::with_capacity(capacity),
            capacity,
            overrun: 0,
        }
    }

    /// Non-blocking enqueue; on a full queue the packet is returned to the
    /// caller (who is responsible for releasing it and bumping
    /// `tx_dropped`), and `overrun` increments.
    pub fn enqueue(&mut self, packet: Packet<Buf>) -> Result<(), Packet<Buf>> {
        if self.pending.len() >= self.capacity {
            self.overrun += 1;
            return Err(packet);
        }
        self.pending.push_back(packet);
        Ok(())
    }

    pub fn dequeue_batch(&mut self, budget: usize) -> Vec<Packet<Buf>> {
        let n = budget.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    #[must_use]
    pub fn overrun(&self) -> u64 {
        self.overrun
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A named switch port: identity, state, and one output queue set. Generic
/// over the queue count bound is not attempted here; `queues` is a plain
/// `Vec` capped by `PortConfig` at admission time.
#[derive(Debug)]
pub struct SwitchPort<Buf: PacketBufferMut> {
    pub port_num: u32,
    pub name: String,
    pub mac: Mac,
    pub admin_state: AdminState,
    pub link_state: LinkState,
    pub config: PortConfigFlags,
    pub mtu: u16,
    pub queues: Vec<PortQueue<Buf>>,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub tx_errors: u64,
}

impl<Buf: PacketBufferMut> SwitchPort<Buf> {
    #[must_use]
    pub fn new(port_num: u32, name: String, mac: Mac, mtu: u16, num_queues: usize, queue_depth: usize) -> Self {
        SwitchPort {
            port_num,
            name,
            mac,
            admin_state: AdminState::Down,
            link_state: LinkState::NotDetected,
            config: PortConfigFlags::FORWARD_PACKETS,
            mtu,
            queues: (0..num_queues.max(1)).map(|_| PortQueue::new(queue_depth)).collect(),
            rx_dropped: 0,
            tx_dropped: 0,
            tx_errors: 0,
        }
    }

    /// §3 invariant: emission requires `forward_packets ∧ up`.
    #[must_use]
    pub fn may_emit(&self) -> bool {
        self.config.contains(PortConfigFlags::FORWARD_PACKETS) && self.admin_state == AdminState::Up
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("ioctl failed bringing port up/down: {0}")]
    Io(#[from] std::io::Error),
    #[error("ring reset failed: {0}")]
    RingReset(String),
}

/// The contract every port kind satisfies, matched over a tagged enum
/// rather than dispatched through a trait object (§9 "Dynamic type
/// dispatch over port kinds" redesign flag).
pub trait NicPort<Buf: PacketBufferMut> {
    fn up(&mut self) -> Result<(), PortError>;
    fn down(&mut self) -> Result<(), PortError>;
    /// Poll for the next ready frame. Non-blocking: `Ok(None)` means the
    /// ring is currently empty, not an error.
    fn read(&mut self) -> Result<Option<Packet<Buf>>, PortError>;
    /// Drain up to `budget` queued packets to the wire, returning the
    /// unused budget.
    fn write(&mut self, queue: &mut PortQueue<Buf>, budget: usize) -> Result<usize, PortError>;
}

/// The drain interval the scheduler targets for TX flushing (§4.4).
pub const TX_DRAIN_INTERVAL: Duration = Duration::from_micros(100);

#[cfg(test)]
mod test {
    use super::*;
    use xdpd_net::buffer::TestBuffer;
    use etherparse::PacketBuilder;

    fn frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1, 2);
        let payload = b"x";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn queue_enqueue_respects_capacity_and_counts_overrun() {
        let mut queue: PortQueue<TestBuffer> = PortQueue::new(1);
        let bytes = frame();
        let make = || Packet::new(TestBuffer::new(&bytes, 64, 64), None, true).unwrap();
        queue.enqueue(make()).unwrap();
        assert!(queue.enqueue(make()).is_err());
        assert_eq!(queue.overrun(), 1);
    }

    #[test]
    fn port_may_emit_requires_up_and_forwarding() {
        let port: SwitchPort<TestBuffer> = SwitchPort::new(1, "eth0".to_string(), Mac::ZERO, 1500, 1, 8);
        assert!(!port.may_emit());
    }
}
