// SPDX-License-Identifier: Apache-2.0

//! The virtual-link port pair (§4.2 "Virtual-link port"): two ports
//! cross-connected entirely in software, for VM/container attachment
//! without a kernel veth. A peer's TX becomes the other peer's RX; packets
//! are reinjected at the peer's `port_num` without ever touching the NIC
//! boundary.

use xdpd_net::buffer::PacketBufferMut;
use xdpd_net::eth::mac::rand_bytes::RandBytes;
use xdpd_net::eth::Mac;
use xdpd_net::packet::Packet;

use crate::port::{NicPort, PortError, PortQueue};

/// Adapts `rand::RngCore` to the minimal [`RandBytes`] seam `xdpd-net`
/// exposes, so this crate (the only one that needs to generate a MAC) can
/// pull in `rand` without pushing that dependency onto `xdpd-net` itself.
pub struct ThreadRngBytes(rand::rngs::ThreadRng);

impl Default for ThreadRngBytes {
    fn default() -> Self {
        ThreadRngBytes(rand::thread_rng())
    }
}

impl RandBytes for ThreadRngBytes {
    fn fill(&mut self, bytes: &mut [u8]) {
        use rand::RngCore;
        self.0.fill_bytes(bytes);
    }
}

/// One end of a virtual-link pair. `peer` is set once at construction and
/// never rebound — "peers immutable once paired" (§4.2).
pub struct VirtualLinkPort<Buf: PacketBufferMut> {
    pub port_num: u32,
    pub mac: Mac,
    peer_port_num: u32,
    inbox: PortQueue<Buf>,
}

impl<Buf: PacketBufferMut> VirtualLinkPort<Buf> {
    /// Build both ends of a pair at once: `(a, b)`, each with a freshly
    /// generated locally-administered MAC and no shared mutable state other
    /// than their cross-referenced `port_num`s.
    pub fn new_pair(
        port_num_a: u32,
        port_num_b: u32,
        inbox_capacity: usize,
        rng: &mut impl RandBytes,
    ) -> (Self, Self) {
        let a = VirtualLinkPort {
            port_num: port_num_a,
            mac: Mac::new_locally_administered(rng),
            peer_port_num: port_num_b,
            inbox: PortQueue::new(inbox_capacity),
        };
        let b = VirtualLinkPort {
            port_num: port_num_b,
            mac: Mac::new_locally_administered(rng),
            peer_port_num: port_num_a,
            inbox: PortQueue::new(inbox_capacity),
        };
        (a, b)
    }

    #[must_use]
    pub fn peer_port_num(&self) -> u32 {
        self.peer_port_num
    }

    /// Deliver a packet transmitted by the peer into this end's inbox, to
    /// be picked up by the next `read()`. Returns the packet back on a full
    /// inbox so the caller can account the drop against the sender's
    /// `tx_dropped`.
    pub fn deliver_from_peer(&mut self, packet: Packet<Buf>) -> Result<(), Packet<Buf>> {
        self.inbox.enqueue(packet)
    }

}

impl<Buf: PacketBufferMut> NicPort<Buf> for VirtualLinkPort<Buf> {
    fn up(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn down(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    /// Pull the next packet the peer has sent us, if any.
    fn read(&mut self) -> Result<Option<Packet<Buf>>, PortError> {
        Ok(self.inbox.dequeue_batch(1).into_iter().next())
    }

    /// A virtual link has no wire to drain to; transmission is entirely the
    /// manager's job of calling `deliver_from_peer` on the other end. This
    /// always reports the full budget unused.
    fn write(&mut self, _queue: &mut PortQueue<Buf>, budget: usize) -> Result<usize, PortError> {
        Ok(budget)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;
    use xdpd_net::buffer::TestBuffer;

    struct Xorshift(u64);
    impl RandBytes for Xorshift {
        fn fill(&mut self, bytes: &mut [u8]) {
            for b in bytes {
                self.0 ^= self.0 << 13;
                self.0 ^= self.0 >> 7;
                self.0 ^= self.0 << 17;
                *b = self.0 as u8;
            }
        }
    }

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
    fn pair_gets_distinct_locally_administered_macs() {
        let mut rng = Xorshift(1);
        let (a, b): (VirtualLinkPort<TestBuffer>, VirtualLinkPort<TestBuffer>) =
            VirtualLinkPort::new_pair(1, 2, 8, &mut rng);
        assert!(a.mac.is_local());
        assert!(b.mac.is_local());
        assert_ne!(a.mac, b.mac);
        assert_eq!(a.peer_port_num(), 2);
        assert_eq!(b.peer_port_num(), 1);
    }

    #[test]
    fn delivered_packet_is_read_back_on_the_peer() {
        let mut rng = Xorshift(2);
        let (_a, mut b): (VirtualLinkPort<TestBuffer>, VirtualLinkPort<TestBuffer>) =
            VirtualLinkPort::new_pair(1, 2, 8, &mut rng);
        let bytes = frame();
        let packet = Packet::new(TestBuffer::new(&bytes, 64, 64), None, true).unwrap();
        b.deliver_from_peer(packet).unwrap();
        assert!(b.read().unwrap().is_some());
        assert!(b.read().unwrap().is_none());
    }
}
