// SPDX-License-Identifier: Apache-2.0

//! Classifier state: what protocol stack was found while parsing a frame,
//! and which header checksums a set-field action has invalidated and must
//! be recomputed in software before the frame leaves the datapath.

use bitflags::bitflags;

/// Which network-layer protocol (if any) classification found past any
/// VLAN tag and MPLS label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum L3Protocol {
    #[default]
    None,
    Arp,
    Ipv4,
    Ipv6,
}

/// Which transport-layer protocol (if any) classification found inside the
/// L3 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum L4Protocol {
    #[default]
    None,
    Icmpv4,
    Icmpv6,
    Tcp,
    Udp,
    Sctp,
}

/// Which well-known headers were found while classifying a frame. VLAN and
/// MPLS are independent of the L3/L4 protocol that follows them, so they
/// are flags rather than folded into a cartesian-product enum the way
/// L3/L4 combinations would otherwise have to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolStack {
    pub vlan: bool,
    pub mpls: bool,
    pub l3: L3Protocol,
    pub l4: L4Protocol,
}

impl ProtocolStack {
    #[must_use]
    pub fn has_vlan(self) -> bool {
        self.vlan
    }

    #[must_use]
    pub fn has_mpls(self) -> bool {
        self.mpls
    }

    #[must_use]
    pub fn has_arp(self) -> bool {
        self.l3 == L3Protocol::Arp
    }

    #[must_use]
    pub fn has_ipv4(self) -> bool {
        self.l3 == L3Protocol::Ipv4
    }

    #[must_use]
    pub fn has_ipv6(self) -> bool {
        self.l3 == L3Protocol::Ipv6
    }

    #[must_use]
    pub fn has_tcp(self) -> bool {
        self.l4 == L4Protocol::Tcp
    }

    #[must_use]
    pub fn has_udp(self) -> bool {
        self.l4 == L4Protocol::Udp
    }

    #[must_use]
    pub fn has_sctp(self) -> bool {
        self.l4 == L4Protocol::Sctp
    }

    #[must_use]
    pub fn has_icmpv4(self) -> bool {
        self.l4 == L4Protocol::Icmpv4
    }

    #[must_use]
    pub fn has_icmpv6(self) -> bool {
        self.l4 == L4Protocol::Icmpv6
    }
}

bitflags! {
    /// Which checksums a set-field action has invalidated and the action
    /// executor must recompute in software before transmit, since this
    /// datapath has no hardware checksum offload path (§4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChecksumLayer: u8 {
        const IPV4_HEADER = 0b0001;
        const TCP = 0b0010;
        const UDP = 0b0100;
        const SCTP = 0b1000;
    }
}

/// Per-frame offsets and dirty-checksum bitmask produced by classification
/// and consulted by the match engine, action executor, and checksum fixup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierState {
    pub stack: ProtocolStack,
    pub eth_offset: usize,
    pub vlan_offset: Option<usize>,
    pub mpls_offset: Option<usize>,
    pub l3_offset: Option<usize>,
    pub l4_offset: Option<usize>,
    /// The `ETH_TYPE` OXM value: the ethertype immediately following any
    /// VLAN tag, but naming the MPLS shim itself (not the IP payload
    /// beneath it) for an MPLS-labeled frame, per how OpenFlow's own
    /// ETH_TYPE/MPLS_LABEL match fields divide the work.
    pub l2_ether_type: u16,
    pub dirty_checksums: ChecksumLayer,
}

impl ClassifierState {
    #[must_use]
    pub fn eth_only(eth_offset: usize) -> Self {
        ClassifierState {
            stack: ProtocolStack::default(),
            eth_offset,
            vlan_offset: None,
            mpls_offset: None,
            l3_offset: None,
            l4_offset: None,
            l2_ether_type: 0,
            dirty_checksums: ChecksumLayer::empty(),
        }
    }

    pub fn mark_dirty(&mut self, layer: ChecksumLayer) {
        self.dirty_checksums |= layer;
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dirty_checksums.is_empty()
    }
}
