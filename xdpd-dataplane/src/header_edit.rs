// SPDX-License-Identifier: Apache-2.0

//! In-place header push/pop/set-field primitives (§4.6 "Header push/pop",
//! "Set-field"): splice a VLAN tag in or out, rewrite the VID/PCP of an
//! existing tag, and rewrite DSCP, all by shifting bytes in the packet's
//! own buffer and re-classifying — no fresh allocation on the common path.

use xdpd_net::buffer::{PacketBufferMut, Prepend, TrimFromStart};
use xdpd_net::classifier::ChecksumLayer;
use xdpd_net::eth::Eth;
use xdpd_net::packet::Packet;
use xdpd_net::vlan::Vlan;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderEditError {
    #[error("no room to grow the buffer for a header push")]
    InsufficientRoom,
    #[error("packet does not carry a VLAN tag")]
    NoVlanTag,
    #[error("packet does not carry an MPLS label")]
    NoMplsLabel,
    #[error("re-classification after rewrite failed")]
    Reclassify,
}

/// `PUSH_VLAN`: splice a 4-byte 802.1Q/802.1ad tag in right after the
/// source MAC, growing into headroom. A frame that already carries a tag
/// gets a second (QinQ) one spliced in front of it, same as the wire
/// datapath.
pub fn push_vlan<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, tag: Vlan) -> Result<(), HeaderEditError> {
    packet
        .buffer_mut()
        .prepend(&[0u8; 4])
        .map_err(|_| HeaderEditError::InsufficientRoom)?;

    let body = packet.buffer_mut().as_mut();
    // `prepend` grew the front by 4; shift the 12-byte dst+src MAC pair
    // back over the placeholder so it again leads the frame, opening up
    // offset 12..16 for the new tag.
    body.copy_within(4..16, 0);
    body[12..16].copy_from_slice(&tag.to_bytes());

    packet.reclassify().map_err(|_| HeaderEditError::Reclassify)
}

/// `POP_VLAN`: remove the outermost 4-byte tag, shrinking the buffer back
/// into headroom.
pub fn pop_vlan<Buf: PacketBufferMut>(packet: &mut Packet<Buf>) -> Result<(), HeaderEditError> {
    if packet.headers().vlan.is_none() || packet.headers().state.vlan_offset.is_none() {
        return Err(HeaderEditError::NoVlanTag);
    }

    let body = packet.buffer_mut().as_mut();
    // Shift dst+src MAC forward over the tag; the 4 stale leading bytes
    // this leaves are exactly what `trim_from_start` below discards.
    body.copy_within(0..12, 4);
    packet.buffer_mut().trim_from_start(4);

    packet.reclassify().map_err(|_| HeaderEditError::Reclassify)
}

/// `SET_VLAN_VID`/`SET_VLAN_PCP`: rewrite the existing tag's fields in
/// place (same size, no shift needed).
pub fn set_vlan_field<Buf: PacketBufferMut>(
    packet: &mut Packet<Buf>,
    edit: impl FnOnce(&mut Vlan),
) -> Result<(), HeaderEditError> {
    let Some(offset) = packet.headers().state.vlan_offset else {
        return Err(HeaderEditError::NoVlanTag);
    };
    let Some(mut vlan) = packet.headers().vlan else {
        return Err(HeaderEditError::NoVlanTag);
    };
    edit(&mut vlan);
    let bytes = vlan.to_bytes();
    packet.buffer_mut().as_mut()[offset..offset + bytes.len()].copy_from_slice(&bytes);
    packet.reclassify().map_err(|_| HeaderEditError::Reclassify)
}

/// `SET_MPLS_TTL`: rewrite the top label's TTL in place (same size, no
/// shift needed), mirroring [`set_vlan_field`].
pub fn set_mpls_ttl<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, ttl: u8) -> Result<(), HeaderEditError> {
    let Some(offset) = packet.headers().state.mpls_offset else {
        return Err(HeaderEditError::NoMplsLabel);
    };
    let Some(mut label) = packet.headers().mpls else {
        return Err(HeaderEditError::NoMplsLabel);
    };
    label.ttl = ttl;
    let bytes = label.to_bytes();
    packet.buffer_mut().as_mut()[offset..offset + bytes.len()].copy_from_slice(&bytes);
    packet.reclassify().map_err(|_| HeaderEditError::Reclassify)
}

/// `SET_ETH_SRC`/`SET_ETH_DST`: rewrite the Ethernet header in place.
pub fn set_eth_field<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, edit: impl FnOnce(&mut Eth)) {
    let mut eth = packet.headers().eth;
    edit(&mut eth);
    let mut out = [0u8; Eth::HEADER_LEN];
    eth.write(&mut out).expect("fixed-size header always fits its own length");
    packet.buffer_mut().as_mut()[..out.len()].copy_from_slice(&out);
    packet.headers_mut().eth = eth;
}

/// `SET_NW_TOS`/DSCP rewrite: the DSCP is the top 6 bits of the IPv4 ToS
/// byte (offset 1) or the top 6 bits of the IPv6 traffic-class field
/// (split across the low nibble of byte 0 and the high nibble of byte 1).
/// Marks the IPv4 header checksum dirty; IPv6 has none to fix up.
pub fn set_ip_dscp<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, dscp: u8) -> Option<ChecksumLayer> {
    let dscp = dscp & 0x3F;
    let l3_offset = packet.headers().state.l3_offset?;
    let is_v4 = packet.headers().ip.as_ref().is_some_and(|ip| matches!(ip, xdpd_net::ip::Ip::V4(_)));
    let body = packet.buffer_mut().as_mut();
    if is_v4 {
        if body.len() <= l3_offset + 1 {
            return None;
        }
        let ecn = body[l3_offset + 1] & 0x3;
        body[l3_offset + 1] = (dscp << 2) | ecn;
        Some(ChecksumLayer::IPV4_HEADER)
    } else {
        if body.len() <= l3_offset + 1 {
            return None;
        }
        body[l3_offset] = (body[l3_offset] & 0xF0) | (dscp >> 2);
        body[l3_offset + 1] = (body[l3_offset + 1] & 0x0F) | ((dscp & 0x3) << 6);
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;
    use xdpd_net::buffer::TestBuffer;
    use xdpd_net::vlan::Tpid;

    fn udp_v4_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    fn mpls_tagged_udp_v4_frame(ttl: u8) -> Vec<u8> {
        let label = xdpd_net::mpls::MplsLabel {
            label: 100,
            traffic_class: 0,
            bos: true,
            ttl,
        };
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
        out.extend_from_slice(&xdpd_net::mpls::UNICAST_ETHERTYPE.to_be_bytes());
        out.extend_from_slice(&label.to_bytes());
        out.extend_from_slice(&ip_udp);
        out
    }

    fn packet_with_headroom() -> Packet<TestBuffer> {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 32, 32);
        Packet::new(buf, None, true).unwrap()
    }

    #[test]
    fn push_then_pop_vlan_round_trips_original_frame() {
        let mut packet = packet_with_headroom();
        let original_len = packet.len();
        let tag = Vlan {
            tpid: Tpid::CTag,
            pcp: 3,
            dei: false,
            vid: 42,
        };
        push_vlan(&mut packet, tag).unwrap();
        assert_eq!(packet.len(), original_len + 4);
        assert_eq!(packet.headers().vlan, Some(tag));
        assert_eq!(packet.headers().eth.source(), xdpd_net::eth::Mac([1, 2, 3, 4, 5, 6]));

        pop_vlan(&mut packet).unwrap();
        assert_eq!(packet.len(), original_len);
        assert!(packet.headers().vlan.is_none());
        assert_eq!(packet.headers().eth.destination(), xdpd_net::eth::Mac([6, 5, 4, 3, 2, 1]));
    }

    #[test]
    fn pop_vlan_without_a_tag_errors() {
        let mut packet = packet_with_headroom();
        assert_eq!(pop_vlan(&mut packet).unwrap_err(), HeaderEditError::NoVlanTag);
    }

    #[test]
    fn set_vlan_vid_rewrites_in_place() {
        let mut packet = packet_with_headroom();
        push_vlan(
            &mut packet,
            Vlan {
                tpid: Tpid::CTag,
                pcp: 0,
                dei: false,
                vid: 10,
            },
        )
        .unwrap();
        set_vlan_field(&mut packet, |v| v.vid = 20).unwrap();
        assert_eq!(packet.headers().vlan.unwrap().vid, 20);
    }

    #[test]
    fn set_ip_dscp_marks_ipv4_checksum_dirty() {
        let mut packet = packet_with_headroom();
        let layer = set_ip_dscp(&mut packet, 0x3F);
        assert_eq!(layer, Some(ChecksumLayer::IPV4_HEADER));
    }

    #[test]
    fn set_mpls_ttl_rewrites_top_label_in_place() {
        let frame = mpls_tagged_udp_v4_frame(64);
        let buf = TestBuffer::new(&frame, 32, 32);
        let mut packet = Packet::new(buf, None, true).unwrap();
        assert_eq!(packet.headers().mpls.unwrap().ttl, 64);

        set_mpls_ttl(&mut packet, 1).unwrap();
        assert_eq!(packet.headers().mpls.unwrap().ttl, 1);
        // same-size in-place rewrite: no shift, length unchanged.
        assert_eq!(packet.len(), frame.len());
        assert!(packet.headers().udp.is_some());
    }

    #[test]
    fn set_mpls_ttl_without_a_label_errors() {
        let mut packet = packet_with_headroom();
        assert_eq!(set_mpls_ttl(&mut packet, 1).unwrap_err(), HeaderEditError::NoMplsLabel);
    }
}
