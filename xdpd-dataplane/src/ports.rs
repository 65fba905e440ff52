// SPDX-License-Identifier: Apache-2.0

//! The tagged port-kind enum (§9 "Dynamic type dispatch over port kinds"):
//! every concrete port driver this datapath knows about, matched rather
//! than dispatched through a trait object, plus the shared port registry
//! the scheduler's fan-out tables and the action executor's `OUTPUT` both
//! index into.

use std::collections::HashMap;
use std::sync::Arc;

use xdpd_concurrency::sync::RwLock;
use xdpd_interface_manager::port::{NicPort, PortError, PortQueue, SwitchPort};
use xdpd_interface_manager::{KernelRingPort, VirtualLinkPort};
use xdpd_net::buffer::{BufferPool, PacketBufferMut};
use xdpd_net::packet::Packet;

/// Every port driver kind this datapath admits (§9 redesign flag).
pub enum PortKind<Buf, P> {
    KernelRing(KernelRingPort<Buf, P>),
    VirtualLink(VirtualLinkPort<Buf>),
}

impl<Buf, P> NicPort<Buf> for PortKind<Buf, P>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    fn up(&mut self) -> Result<(), PortError> {
        match self {
            PortKind::KernelRing(p) => p.up(),
            PortKind::VirtualLink(p) => p.up(),
        }
    }

    fn down(&mut self) -> Result<(), PortError> {
        match self {
            PortKind::KernelRing(p) => p.down(),
            PortKind::VirtualLink(p) => p.down(),
        }
    }

    fn read(&mut self) -> Result<Option<Packet<Buf>>, PortError> {
        match self {
            PortKind::KernelRing(p) => p.read(),
            PortKind::VirtualLink(p) => p.read(),
        }
    }

    fn write(&mut self, queue: &mut PortQueue<Buf>, budget: usize) -> Result<usize, PortError> {
        match self {
            PortKind::KernelRing(p) => p.write(queue, budget),
            PortKind::VirtualLink(p) => p.write(queue, budget),
        }
    }
}

impl<Buf, P> PortKind<Buf, P>
where
    Buf: PacketBufferMut,
{
    /// The peer port number to reinject into, for a virtual-link port only
    /// (§4.6 "If the port is virtual, rewrite `port_in` and reinject into
    /// the peer's pipeline").
    #[must_use]
    pub fn virtual_peer(&self) -> Option<u32> {
        match self {
            PortKind::KernelRing(_) => None,
            PortKind::VirtualLink(v) => Some(v.peer_port_num()),
        }
    }

    pub fn deliver_from_peer(&mut self, packet: Packet<Buf>) -> Result<(), Packet<Buf>> {
        match self {
            PortKind::KernelRing(_) => Err(packet),
            PortKind::VirtualLink(v) => v.deliver_from_peer(packet),
        }
    }
}

/// One admitted port: its descriptive/counter state plus the concrete
/// driver used to poll it.
pub struct PortEntry<Buf, P> {
    pub switch_port: SwitchPort<Buf>,
    pub driver: PortKind<Buf, P>,
}

/// The shared, cross-core port table (§4.4 "present in every core's
/// port-bursts fan-out table"). Every core's TX path and the action
/// executor's `OUTPUT`/`FLOOD`/`ALL` reach every port through this, while RX
/// polling for a given port is only ever driven by the core it's scheduled
/// on.
#[derive(Clone)]
pub struct PortRegistry<Buf, P> {
    inner: Arc<RwLock<HashMap<u32, PortEntry<Buf, P>>>>,
}

impl<Buf, P> Default for PortRegistry<Buf, P> {
    fn default() -> Self {
        PortRegistry {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Buf, P> PortRegistry<Buf, P>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    pub fn insert(&self, entry: PortEntry<Buf, P>) {
        self.inner.write().unwrap().insert(entry.switch_port.port_num, entry);
    }

    pub fn remove(&self, port_num: u32) -> Option<PortEntry<Buf, P>> {
        self.inner.write().unwrap().remove(&port_num)
    }

    #[must_use]
    pub fn port_nums(&self) -> Vec<u32> {
        self.inner.read().unwrap().keys().copied().collect()
    }

    pub fn with_entry<R>(&self, port_num: u32, f: impl FnOnce(&mut PortEntry<Buf, P>) -> R) -> Option<R> {
        self.inner.write().unwrap().get_mut(&port_num).map(f)
    }

    pub fn for_each_other<R>(&self, exclude: u32, mut f: impl FnMut(&mut PortEntry<Buf, P>) -> R) {
        for (port_num, entry) in self.inner.write().unwrap().iter_mut() {
            if *port_num != exclude {
                f(entry);
            }
        }
    }
}
