// SPDX-License-Identifier: Apache-2.0

//! Match fields: a value/mask pair per OXM-equivalent field, and the
//! `ClassifierState`-driven lookup key built from a parsed packet.

use xdpd_net::classifier::ClassifierState;
use xdpd_net::eth::Mac;
use xdpd_net::headers::Headers;
use xdpd_net::vlan::VidPresence;

/// A type a [`FieldMatch`] can be masked over. Local trait so it can be
/// implemented for [`Mac`], which is foreign to this crate.
pub trait Maskable: Copy + PartialEq {
    fn mask_and(self, mask: Self) -> Self;
}

impl Maskable for u8 {
    fn mask_and(self, mask: Self) -> Self {
        self & mask
    }
}

impl Maskable for u16 {
    fn mask_and(self, mask: Self) -> Self {
        self & mask
    }
}

impl Maskable for u32 {
    fn mask_and(self, mask: Self) -> Self {
        self & mask
    }
}

impl Maskable for Mac {
    fn mask_and(self, mask: Self) -> Self {
        let mut out = [0u8; 6];
        for i in 0..6 {
            out[i] = self.0[i] & mask.0[i];
        }
        Mac(out)
    }
}

/// A single match field: the wildcard-capable, masked comparison OpenFlow
/// calls an OXM TLV. `None` means "wildcarded" (matches anything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMatch<T> {
    pub value: T,
    pub mask: T,
}

impl<T: Maskable> FieldMatch<T> {
    #[must_use]
    pub fn matches(&self, candidate: T) -> bool {
        candidate.mask_and(self.mask) == self.value.mask_and(self.mask)
    }
}

/// The full match specification for one flow entry (§3 "Flow entry").
/// Every field is optional; an absent field is a full wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub in_port: Option<u32>,
    pub eth_src: Option<FieldMatch<Mac>>,
    pub eth_dst: Option<FieldMatch<Mac>>,
    pub eth_type: Option<u16>,
    pub vlan_vid: Option<VidPresence>,
    pub ip_proto: Option<u8>,
    pub ip_dscp: Option<u8>,
    pub ipv4_src: Option<FieldMatch<u32>>,
    pub ipv4_dst: Option<FieldMatch<u32>>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
    pub sctp_src: Option<u16>,
    pub sctp_dst: Option<u16>,
    pub arp_op: Option<u16>,
    pub arp_spa: Option<FieldMatch<u32>>,
    pub arp_tpa: Option<FieldMatch<u32>>,
    pub arp_sha: Option<FieldMatch<Mac>>,
    pub arp_tha: Option<FieldMatch<Mac>>,
    pub icmpv4_type: Option<u8>,
    pub icmpv4_code: Option<u8>,
    pub icmpv6_type: Option<u8>,
    pub icmpv6_code: Option<u8>,
}

impl Match {
    /// True if `self` is more specific than or equally specific as `other`
    /// restricted to the fields `other` actually constrains — i.e. every
    /// packet matching `self` would also match `other`. Used by table
    /// admin to reject overlapping equal-priority entries (§3 invariants).
    #[must_use]
    pub fn is_subset_of(&self, other: &Match) -> bool {
        macro_rules! subset {
            ($field:ident) => {
                match (&self.$field, &other.$field) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(a), Some(b)) => a == b,
                }
            };
        }
        subset!(in_port)
            && subset!(eth_src)
            && subset!(eth_dst)
            && subset!(eth_type)
            && subset!(vlan_vid)
            && subset!(ip_proto)
            && subset!(ip_dscp)
            && subset!(ipv4_src)
            && subset!(ipv4_dst)
            && subset!(tcp_src)
            && subset!(tcp_dst)
            && subset!(udp_src)
            && subset!(udp_dst)
            && subset!(sctp_src)
            && subset!(sctp_dst)
            && subset!(arp_op)
            && subset!(arp_spa)
            && subset!(arp_tpa)
            && subset!(arp_sha)
            && subset!(arp_tha)
            && subset!(icmpv4_type)
            && subset!(icmpv4_code)
            && subset!(icmpv6_type)
            && subset!(icmpv6_code)
    }

    /// Test `self` against a classified packet's header stack.
    #[must_use]
    pub fn matches(&self, in_port: u32, headers: &Headers, state: &ClassifierState) -> bool {
        if self.in_port.is_some_and(|p| p != in_port) {
            return false;
        }
        if self
            .eth_src
            .is_some_and(|m| !m.matches(headers.eth.source()))
        {
            return false;
        }
        if self
            .eth_dst
            .is_some_and(|m| !m.matches(headers.eth.destination()))
        {
            return false;
        }
        // The MPLS-shim or post-VLAN ethertype, not whatever `Eth::parse`
        // happened to consume — for a tagged frame that is the TPID, not a
        // value `ETH_TYPE` is ever supposed to report.
        if self.eth_type.is_some_and(|t| t != state.l2_ether_type) {
            return false;
        }
        if let Some(want_vlan) = self.vlan_vid {
            let have = headers.vlan.map_or(VidPresence::None, |v| VidPresence::Specific(v.vid));
            match (want_vlan, have) {
                (VidPresence::None, VidPresence::None) => {}
                (VidPresence::Present, h) if h != VidPresence::None => {}
                (VidPresence::Specific(vid), VidPresence::Specific(have_vid)) if vid == have_vid => {}
                _ => return false,
            }
        }
        if let Some(want_proto) = self.ip_proto {
            match headers.ip {
                Some(ip) if ip.protocol() == want_proto => {}
                _ => return false,
            }
        }
        if let Some(want_dscp) = self.ip_dscp {
            match headers.ip {
                Some(ip) if ip.dscp() == want_dscp => {}
                _ => return false,
            }
        }
        if let Some(m) = self.ipv4_src {
            match headers.ip {
                Some(xdpd_net::ip::Ip::V4(v4)) if m.matches(u32::from(v4.source())) => {}
                _ => return false,
            }
        }
        if let Some(m) = self.ipv4_dst {
            match headers.ip {
                Some(xdpd_net::ip::Ip::V4(v4)) if m.matches(u32::from(v4.destination())) => {}
                _ => return false,
            }
        }
        if let Some(want) = self.tcp_src {
            match headers.tcp {
                Some(tcp) if tcp.source_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.tcp_dst {
            match headers.tcp {
                Some(tcp) if tcp.destination_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.udp_src {
            match headers.udp {
                Some(udp) if udp.source_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.udp_dst {
            match headers.udp {
                Some(udp) if udp.destination_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.sctp_src {
            match headers.sctp {
                Some(sctp) if sctp.source_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.sctp_dst {
            match headers.sctp {
                Some(sctp) if sctp.destination_port() == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.arp_op {
            match headers.arp {
                Some(arp) if arp.operation.code() == want => {}
                _ => return false,
            }
        }
        if let Some(m) = self.arp_spa {
            match headers.arp {
                Some(arp) if m.matches(u32::from(arp.sender_ip)) => {}
                _ => return false,
            }
        }
        if let Some(m) = self.arp_tpa {
            match headers.arp {
                Some(arp) if m.matches(u32::from(arp.target_ip)) => {}
                _ => return false,
            }
        }
        if let Some(m) = self.arp_sha {
            match headers.arp {
                Some(arp) if m.matches(arp.sender_mac) => {}
                _ => return false,
            }
        }
        if let Some(m) = self.arp_tha {
            match headers.arp {
                Some(arp) if m.matches(arp.target_mac) => {}
                _ => return false,
            }
        }
        if let Some(want) = self.icmpv4_type {
            match headers.icmpv4 {
                Some(icmp) if icmp.icmp_type == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.icmpv4_code {
            match headers.icmpv4 {
                Some(icmp) if icmp.code == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.icmpv6_type {
            match headers.icmpv6 {
                Some(icmp) if icmp.icmp_type == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.icmpv6_code {
            match headers.icmpv6 {
                Some(icmp) if icmp.code == want => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;

    fn vlan_tagged_udp_v4_frame() -> Vec<u8> {
        let ip_udp = {
            let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).udp(1000, 2000);
            let payload = b"payload";
            let mut out = Vec::with_capacity(builder.size(payload.len()));
            builder.write(&mut out, payload).unwrap();
            out
        };
        let mut out = Vec::new();
        out.extend_from_slice(&[6, 5, 4, 3, 2, 1]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&xdpd_net::vlan::Tpid::CTag.ethertype().to_be_bytes());
        let tci: u16 = 42;
        out.extend_from_slice(&tci.to_be_bytes());
        out.extend_from_slice(&0x0800u16.to_be_bytes());
        out.extend_from_slice(&ip_udp);
        out
    }

    fn arp_request_frame() -> Vec<u8> {
        let arp = xdpd_net::arp::Arp {
            operation: xdpd_net::arp::Operation::Request,
            sender_mac: Mac([1, 2, 3, 4, 5, 6]),
            sender_ip: std::net::Ipv4Addr::new(10, 0, 0, 1),
            target_mac: Mac::ZERO,
            target_ip: std::net::Ipv4Addr::new(10, 0, 0, 2),
        };
        let mut out = Vec::new();
        out.extend_from_slice(&[0xff; 6]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&0x0806u16.to_be_bytes());
        out.extend_from_slice(&arp.to_bytes());
        out
    }

    #[test]
    fn eth_type_match_uses_the_post_vlan_ethertype_not_the_raw_eth_field() {
        let frame = vlan_tagged_udp_v4_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let m = Match {
            eth_type: Some(0x0800),
            ..Match::default()
        };
        assert!(m.matches(0, &headers, &headers.state));

        let wrong = Match {
            eth_type: Some(0x8100),
            ..Match::default()
        };
        assert!(!wrong.matches(0, &headers, &headers.state));
    }

    #[test]
    fn arp_op_and_spa_match_a_classified_request() {
        let frame = arp_request_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let m = Match {
            arp_op: Some(1),
            arp_spa: Some(FieldMatch {
                value: u32::from(std::net::Ipv4Addr::new(10, 0, 0, 1)),
                mask: u32::MAX,
            }),
            ..Match::default()
        };
        assert!(m.matches(0, &headers, &headers.state));

        let wrong = Match {
            arp_op: Some(2),
            ..Match::default()
        };
        assert!(!wrong.matches(0, &headers, &headers.state));
    }

    #[test]
    fn empty_match_is_subset_of_everything() {
        let wildcard = Match::default();
        let specific = Match {
            eth_type: Some(0x0800),
            ..Match::default()
        };
        assert!(wildcard.is_subset_of(&specific));
    }

    #[test]
    fn specific_match_is_not_subset_of_unrelated_specific_match() {
        let a = Match {
            eth_type: Some(0x0800),
            ..Match::default()
        };
        let b = Match {
            eth_type: Some(0x86dd),
            ..Match::default()
        };
        assert!(!a.is_subset_of(&b));
    }

    #[test]
    fn field_match_respects_mask() {
        let m = FieldMatch {
            value: 0x0a00_0000u32,
            mask: 0xff00_0000u32,
        };
        assert!(m.matches(0x0a01_0203));
        assert!(!m.matches(0x0b01_0203));
    }
}
