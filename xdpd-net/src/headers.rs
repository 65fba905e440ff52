// SPDX-License-Identifier: Apache-2.0

//! The parsed header stack for one frame: the always-present Ethernet
//! header plus whichever of VLAN/MPLS/ARP/IP/ICMP/TCP/UDP/SCTP
//! classification found.

use thiserror::Error;

use crate::arp::{Arp, ArpError};
use crate::classifier::{ChecksumLayer, ClassifierState, L3Protocol, L4Protocol, ProtocolStack};
use crate::eth::{Eth, EthError};
use crate::icmp::{IcmpError, Icmpv4, Icmpv6};
use crate::ip::{Ip, IpError};
use crate::mpls::{self, MplsError, MplsLabel};
use crate::sctp::{Sctp, SctpError};
use crate::tcp::{Tcp, TcpError};
use crate::udp::{Udp, UdpError};
use crate::vlan::{Tpid, Vlan};

const ARP_ETHERTYPE: u16 = 0x0806;
const ICMPV4_PROTOCOL: u8 = 1;
const TCP_PROTOCOL: u8 = 6;
const UDP_PROTOCOL: u8 = 17;
const ICMPV6_PROTOCOL: u8 = 58;
const SCTP_PROTOCOL: u8 = 132;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Eth(#[from] EthError),
    #[error(transparent)]
    Arp(#[from] ArpError),
    #[error(transparent)]
    Mpls(#[from] MplsError),
    #[error(transparent)]
    Ip(#[from] IpError),
    #[error(transparent)]
    Icmp(#[from] IcmpError),
    #[error(transparent)]
    Tcp(#[from] TcpError),
    #[error(transparent)]
    Udp(#[from] UdpError),
    #[error(transparent)]
    Sctp(#[from] SctpError),
}

/// The aggregated parsed header stack: the base Ethernet header plus
/// whichever optional layers classification found, and the
/// [`ClassifierState`] describing which of them are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headers {
    pub eth: Eth,
    pub vlan: Option<Vlan>,
    pub mpls: Option<MplsLabel>,
    pub arp: Option<Arp>,
    pub ip: Option<Ip>,
    pub icmpv4: Option<Icmpv4>,
    pub icmpv6: Option<Icmpv6>,
    pub tcp: Option<Tcp>,
    pub udp: Option<Udp>,
    pub sctp: Option<Sctp>,
    pub state: ClassifierState,
}

impl Headers {
    /// Classify a raw frame, building the full header stack and the
    /// [`ClassifierState`] the match engine consults. VLAN tags reported
    /// out-of-band by the RX ring are supplied via `ring_vlan` and take
    /// precedence over (mutually exclusive with) an in-buffer 802.1Q tag.
    ///
    /// An in-buffer tag needs care: [`Eth::parse`] already consumes the
    /// TPID as the header's own ethertype field, so what follows in the
    /// remainder slice is the TCI and the real inner ethertype, not a
    /// second TPID. The tag is reassembled from those two places rather
    /// than re-parsed as if it started the remainder slice.
    pub fn parse(bytes: &[u8], ring_vlan: Option<Vlan>) -> Result<Self, ParseError> {
        let (eth, rest_after_eth) = Eth::parse(bytes)?;
        let eth_offset = 0;
        let mut rest = rest_after_eth;

        let mut vlan = ring_vlan;
        let mut vlan_offset = None;
        let mut l2_ether_type = u16::from(eth.ether_type());

        if vlan.is_none() {
            if let Some(tpid) = Tpid::from_ethertype(l2_ether_type) {
                if rest.len() >= 4 {
                    let tci = u16::from_be_bytes([rest[0], rest[1]]);
                    let inner_ether_type = u16::from_be_bytes([rest[2], rest[3]]);
                    vlan_offset = Some(bytes.len() - rest.len() - 2);
                    vlan = Some(Vlan {
                        tpid,
                        pcp: ((tci >> 13) & 0x7) as u8,
                        dei: (tci >> 12) & 0x1 != 0,
                        vid: tci & 0x0FFF,
                    });
                    l2_ether_type = inner_ether_type;
                    rest = &rest[4..];
                }
            }
        }

        // Only the top label is modeled (matches SET_MPLS_TTL/DEC_MPLS_TTL,
        // which only ever touch it): a stacked label beneath it is left for
        // `Ip::parse` to fail softly on.
        let mut mpls = None;
        let mut mpls_offset = None;
        if l2_ether_type == mpls::UNICAST_ETHERTYPE || l2_ether_type == mpls::MULTICAST_ETHERTYPE {
            mpls_offset = Some(bytes.len() - rest.len());
            let (label, after_label) = MplsLabel::parse(rest)?;
            mpls = Some(label);
            rest = after_label;
        }

        let mut arp = None;
        let mut ip = None;
        let mut icmpv4 = None;
        let mut icmpv6 = None;
        let mut tcp = None;
        let mut udp = None;
        let mut sctp = None;
        let mut l3_offset = None;
        let mut l4_offset = None;
        let mut l3 = L3Protocol::None;
        let mut l4 = L4Protocol::None;

        if l2_ether_type == ARP_ETHERTYPE {
            l3_offset = Some(bytes.len() - rest.len());
            let (parsed, _after) = Arp::parse(rest)?;
            arp = Some(parsed);
            l3 = L3Protocol::Arp;
        } else if let Ok((parsed_ip, after_ip)) = Ip::parse(rest) {
            l3_offset = Some(bytes.len() - rest.len());
            let l4_start = bytes.len() - after_ip.len();
            l3 = match parsed_ip {
                Ip::V4(_) => L3Protocol::Ipv4,
                Ip::V6(_) => L3Protocol::Ipv6,
            };
            match parsed_ip.protocol() {
                TCP_PROTOCOL => {
                    let (parsed_tcp, _) = Tcp::parse(after_ip)?;
                    tcp = Some(parsed_tcp);
                    l4_offset = Some(l4_start);
                    l4 = L4Protocol::Tcp;
                }
                UDP_PROTOCOL => {
                    let (parsed_udp, _) = Udp::parse(after_ip)?;
                    udp = Some(parsed_udp);
                    l4_offset = Some(l4_start);
                    l4 = L4Protocol::Udp;
                }
                SCTP_PROTOCOL => {
                    let (parsed_sctp, _) = Sctp::parse(after_ip)?;
                    sctp = Some(parsed_sctp);
                    l4_offset = Some(l4_start);
                    l4 = L4Protocol::Sctp;
                }
                ICMPV4_PROTOCOL if matches!(parsed_ip, Ip::V4(_)) => {
                    let (parsed_icmp, _) = Icmpv4::parse(after_ip)?;
                    icmpv4 = Some(parsed_icmp);
                    l4_offset = Some(l4_start);
                    l4 = L4Protocol::Icmpv4;
                }
                ICMPV6_PROTOCOL if matches!(parsed_ip, Ip::V6(_)) => {
                    let (parsed_icmp, _) = Icmpv6::parse(after_ip)?;
                    icmpv6 = Some(parsed_icmp);
                    l4_offset = Some(l4_start);
                    l4 = L4Protocol::Icmpv6;
                }
                _ => {}
            }
            ip = Some(parsed_ip);
        }

        let stack = ProtocolStack {
            vlan: vlan.is_some(),
            mpls: mpls.is_some(),
            l3,
            l4,
        };

        let state = ClassifierState {
            stack,
            eth_offset,
            vlan_offset,
            mpls_offset,
            l3_offset,
            l4_offset,
            l2_ether_type,
            dirty_checksums: ChecksumLayer::empty(),
        };

        Ok(Headers {
            eth,
            vlan,
            mpls,
            arp,
            ip,
            icmpv4,
            icmpv6,
            tcp,
            udp,
            sctp,
            state,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arp::Operation;
    use crate::eth::Mac;
    use crate::icmp::Icmpv4;
    use etherparse::PacketBuilder;

    fn udp_v4_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    fn ipv4_udp_payload() -> Vec<u8> {
        let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    /// A genuinely in-buffer-tagged frame: TPID+TCI+inner-ethertype spliced
    /// in right after the source MAC, the way a tagged frame actually looks
    /// on the wire (as opposed to `ring_vlan`, which models a tag reported
    /// out-of-band instead).
    fn vlan_tagged_udp_v4_frame() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[6, 5, 4, 3, 2, 1]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&Tpid::CTag.ethertype().to_be_bytes());
        let tci: u16 = (3u16 << 13) | 42;
        out.extend_from_slice(&tci.to_be_bytes());
        out.extend_from_slice(&0x0800u16.to_be_bytes());
        out.extend_from_slice(&ipv4_udp_payload());
        out
    }

    fn mpls_tagged_udp_v4_frame() -> Vec<u8> {
        let label = MplsLabel {
            label: 100,
            traffic_class: 0,
            bos: true,
            ttl: 32,
        };
        let mut out = Vec::new();
        out.extend_from_slice(&[6, 5, 4, 3, 2, 1]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&mpls::UNICAST_ETHERTYPE.to_be_bytes());
        out.extend_from_slice(&label.to_bytes());
        out.extend_from_slice(&ipv4_udp_payload());
        out
    }

    fn arp_request_frame() -> Vec<u8> {
        let arp = Arp {
            operation: Operation::Request,
            sender_mac: Mac([1, 2, 3, 4, 5, 6]),
            sender_ip: std::net::Ipv4Addr::new(10, 0, 0, 1),
            target_mac: Mac::ZERO,
            target_ip: std::net::Ipv4Addr::new(10, 0, 0, 2),
        };
        let mut out = Vec::new();
        out.extend_from_slice(&[0xff; 6]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&ARP_ETHERTYPE.to_be_bytes());
        out.extend_from_slice(&arp.to_bytes());
        out
    }

    fn ipv4_header_bytes(protocol: u8, payload_len: usize) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[0] = 0x45;
        let total_len = (20 + payload_len) as u16;
        out[2..4].copy_from_slice(&total_len.to_be_bytes());
        out[8] = 64;
        out[9] = protocol;
        out[12..16].copy_from_slice(&[10, 0, 0, 1]);
        out[16..20].copy_from_slice(&[10, 0, 0, 2]);
        out
    }

    fn eth_header_bytes(ether_type: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[6, 5, 4, 3, 2, 1]);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        out.extend_from_slice(&ether_type.to_be_bytes());
        out
    }

    fn sctp_v4_frame() -> Vec<u8> {
        let mut sctp = [0u8; 12];
        sctp[0..2].copy_from_slice(&1000u16.to_be_bytes());
        sctp[2..4].copy_from_slice(&2000u16.to_be_bytes());
        sctp[4..8].copy_from_slice(&0xdead_beefu32.to_be_bytes());

        let mut out = eth_header_bytes(0x0800);
        out.extend_from_slice(&ipv4_header_bytes(SCTP_PROTOCOL, sctp.len()));
        out.extend_from_slice(&sctp);
        out
    }

    fn icmpv4_echo_frame() -> Vec<u8> {
        let icmp = Icmpv4 {
            icmp_type: 8,
            code: 0,
            checksum: 0,
        };
        let payload = icmp.to_bytes();
        let mut out = eth_header_bytes(0x0800);
        out.extend_from_slice(&ipv4_header_bytes(ICMPV4_PROTOCOL, payload.len()));
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn classifies_plain_udp_v4_frame() {
        let frame = udp_v4_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        assert_eq!(
            headers.state.stack,
            ProtocolStack {
                vlan: false,
                mpls: false,
                l3: L3Protocol::Ipv4,
                l4: L4Protocol::Udp,
            }
        );
        assert!(headers.vlan.is_none());
        assert!(headers.udp.is_some());
        assert!(headers.tcp.is_none());
    }

    #[test]
    fn ring_reported_vlan_takes_precedence_over_in_buffer_tag() {
        // `Headers::parse` on its own only classifies; it has no buffer to
        // splice a tag into. `Packet::new` (xdpd_net::packet) is what
        // materializes a ring-reported tag before parsing, so a direct
        // `parse` call still reports no in-buffer offset for one.
        let frame = udp_v4_frame();
        let ring_vlan = Vlan {
            tpid: Tpid::CTag,
            pcp: 0,
            dei: false,
            vid: 42,
        };
        let headers = Headers::parse(&frame, Some(ring_vlan)).unwrap();
        assert_eq!(headers.vlan, Some(ring_vlan));
        assert_eq!(headers.state.stack.l3, L3Protocol::Ipv4);
        assert_eq!(headers.state.stack.l4, L4Protocol::Udp);
        assert!(headers.state.stack.vlan);
        assert!(headers.state.vlan_offset.is_none());
    }

    #[test]
    fn classifies_in_buffer_tagged_udp_v4_frame() {
        let frame = vlan_tagged_udp_v4_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let vlan = headers.vlan.expect("in-buffer tag should have been found");
        assert_eq!(vlan.tpid, Tpid::CTag);
        assert_eq!(vlan.vid, 42);
        assert_eq!(vlan.pcp, 3);
        assert_eq!(headers.state.vlan_offset, Some(12));
        assert_eq!(headers.state.l2_ether_type, 0x0800);
        assert!(headers.udp.is_some());
        assert_eq!(
            headers.state.stack,
            ProtocolStack {
                vlan: true,
                mpls: false,
                l3: L3Protocol::Ipv4,
                l4: L4Protocol::Udp,
            }
        );
    }

    #[test]
    fn classifies_mpls_tagged_frame_and_peels_top_label() {
        let frame = mpls_tagged_udp_v4_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let label = headers.mpls.expect("mpls label should have been found");
        assert_eq!(label.ttl, 32);
        assert_eq!(label.label, 100);
        assert_eq!(headers.state.l2_ether_type, mpls::UNICAST_ETHERTYPE);
        assert_eq!(headers.state.mpls_offset, Some(14));
        assert!(headers.ip.is_some());
        assert!(headers.udp.is_some());
        assert!(headers.state.stack.mpls);
    }

    #[test]
    fn classifies_arp_request() {
        let frame = arp_request_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let arp = headers.arp.expect("arp header should have been found");
        assert_eq!(arp.operation, Operation::Request);
        assert_eq!(headers.state.stack.l3, L3Protocol::Arp);
        assert!(headers.ip.is_none());
    }

    #[test]
    fn classifies_sctp_v4_frame() {
        let frame = sctp_v4_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let sctp = headers.sctp.expect("sctp header should have been found");
        assert_eq!(sctp.source_port(), 1000);
        assert_eq!(sctp.destination_port(), 2000);
        assert_eq!(headers.state.stack.l4, L4Protocol::Sctp);
    }

    #[test]
    fn classifies_icmpv4_echo_request() {
        let frame = icmpv4_echo_frame();
        let headers = Headers::parse(&frame, None).unwrap();
        let icmp = headers.icmpv4.expect("icmpv4 header should have been found");
        assert_eq!(icmp.icmp_type, 8);
        assert_eq!(headers.state.stack.l4, L4Protocol::Icmpv4);
    }

    #[test]
    fn short_frame_fails_at_eth_parse() {
        let short = [0u8; 4];
        assert!(matches!(Headers::parse(&short, None), Err(ParseError::Eth(_))));
    }

    #[test]
    fn malformed_arp_header_is_a_hard_parse_error() {
        let mut frame = eth_header_bytes(ARP_ETHERTYPE);
        frame.extend_from_slice(&[0u8; 4]);
        assert!(matches!(Headers::parse(&frame, None), Err(ParseError::Arp(_))));
    }
}
