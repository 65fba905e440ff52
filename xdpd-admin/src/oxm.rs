// SPDX-License-Identifier: Apache-2.0

//! Wire-to-internal translation (§4.8): the open-ended OXM TLV form a
//! controller message carries, translated into the typed [`Match`] and
//! [`Action`] representations the pipeline and executor operate on.
//!
//! Wire (de)serialization of the TLVs themselves is a non-goal (§1); this
//! module only specifies the mapping once a message has already been
//! decoded into [`OxmField`]/[`OxmAction`] values.

use xdpd_flow_entry::{Action, FieldMatch, Match};
use xdpd_net::eth::Mac;
use xdpd_net::vlan::VidPresence;

/// `OFPVID_PRESENT`, the bit that marks a VLAN_VID OXM value as carrying a
/// real VID rather than the "no tag" sentinel.
const OFPVID_PRESENT: u16 = 0x1000;
const OFPVID_NONE: u16 = 0x0000;

/// One recognized OXM class+field, already decoded off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OxmField {
    InPort(u32),
    EthSrc { value: Mac, mask: Mac },
    EthDst { value: Mac, mask: Mac },
    EthType(u16),
    VlanVid { value: u16, mask: u16 },
    IpProto(u8),
    IpDscp(u8),
    Ipv4Src { value: u32, mask: u32 },
    Ipv4Dst { value: u32, mask: u32 },
    TcpSrc(u16),
    TcpDst(u16),
    UdpSrc(u16),
    UdpDst(u16),
    SctpSrc(u16),
    SctpDst(u16),
    ArpOp(u16),
    ArpSpa { value: u32, mask: u32 },
    ArpTpa { value: u32, mask: u32 },
    ArpSha { value: Mac, mask: Mac },
    ArpTha { value: Mac, mask: Mac },
    Icmpv4Type(u8),
    Icmpv4Code(u8),
    Icmpv6Type(u8),
    Icmpv6Code(u8),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("VLAN_VID value 0x{value:04x} with mask 0x{mask:04x} is not a representable presence encoding")]
    ImpossibleVlanEncoding { value: u16, mask: u16 },
}

fn decode_vlan_vid(value: u16, mask: u16) -> Result<VidPresence, TranslationError> {
    match (value, mask) {
        (OFPVID_NONE, 0xffff) => Ok(VidPresence::None),
        (OFPVID_PRESENT, OFPVID_PRESENT) => Ok(VidPresence::Present),
        (v, m) if m == 0xffff && v & OFPVID_PRESENT != 0 => Ok(VidPresence::Specific(v & !OFPVID_PRESENT)),
        (value, mask) => Err(TranslationError::ImpossibleVlanEncoding { value, mask }),
    }
}

/// Fold a decoded OXM field list into a [`Match`]. A field repeated in the
/// list silently overwrites the earlier one (mirrors how a table's `Match`
/// has exactly one slot per field, so there is nothing else a duplicate
/// could mean).
pub fn translate_match(fields: &[OxmField]) -> Result<Match, TranslationError> {
    let mut out = Match::default();
    for field in fields {
        match *field {
            OxmField::InPort(p) => out.in_port = Some(p),
            OxmField::EthSrc { value, mask } => out.eth_src = Some(FieldMatch { value, mask }),
            OxmField::EthDst { value, mask } => out.eth_dst = Some(FieldMatch { value, mask }),
            OxmField::EthType(t) => out.eth_type = Some(t),
            OxmField::VlanVid { value, mask } => out.vlan_vid = Some(decode_vlan_vid(value, mask)?),
            OxmField::IpProto(p) => out.ip_proto = Some(p),
            OxmField::IpDscp(d) => out.ip_dscp = Some(d),
            OxmField::Ipv4Src { value, mask } => out.ipv4_src = Some(FieldMatch { value, mask }),
            OxmField::Ipv4Dst { value, mask } => out.ipv4_dst = Some(FieldMatch { value, mask }),
            OxmField::TcpSrc(p) => out.tcp_src = Some(p),
            OxmField::TcpDst(p) => out.tcp_dst = Some(p),
            OxmField::UdpSrc(p) => out.udp_src = Some(p),
            OxmField::UdpDst(p) => out.udp_dst = Some(p),
            OxmField::SctpSrc(p) => out.sctp_src = Some(p),
            OxmField::SctpDst(p) => out.sctp_dst = Some(p),
            OxmField::ArpOp(op) => out.arp_op = Some(op),
            OxmField::ArpSpa { value, mask } => out.arp_spa = Some(FieldMatch { value, mask }),
            OxmField::ArpTpa { value, mask } => out.arp_tpa = Some(FieldMatch { value, mask }),
            OxmField::ArpSha { value, mask } => out.arp_sha = Some(FieldMatch { value, mask }),
            OxmField::ArpTha { value, mask } => out.arp_tha = Some(FieldMatch { value, mask }),
            OxmField::Icmpv4Type(t) => out.icmpv4_type = Some(t),
            OxmField::Icmpv4Code(c) => out.icmpv4_code = Some(c),
            OxmField::Icmpv6Type(t) => out.icmpv6_type = Some(t),
            OxmField::Icmpv6Code(c) => out.icmpv6_code = Some(c),
        }
    }
    Ok(out)
}

/// The canonical action encoding, one variant per [`Action`] kind, used both
/// to decode a controller's flow-mod action list and to encode a stats
/// reply's action list back out (§4.8 "Action translation is symmetric").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OxmAction {
    Output { port: u32, max_len: Option<u16> },
    SetQueue(u32),
    Group(u32),
    PushVlan { ethertype: u16 },
    PopVlan,
    SetVlanVid(u16),
    SetVlanPcp(u8),
    SetEthSrc(Mac),
    SetEthDst(Mac),
    SetIpv4Src(u32),
    SetIpv4Dst(u32),
    SetIpDscp(u8),
    SetTcpSrc(u16),
    SetTcpDst(u16),
    SetUdpSrc(u16),
    SetUdpDst(u16),
    SetSctpSrc(u16),
    SetSctpDst(u16),
    SetMplsTtl(u8),
    DecMplsTtl,
    SetNwTtl(u8),
    DecNwTtl,
    CopyTtlOut,
    CopyTtlIn,
    Drop,
}

impl From<OxmAction> for Action {
    fn from(value: OxmAction) -> Self {
        match value {
            OxmAction::Output { port, max_len } => Action::Output { port, max_len },
            OxmAction::SetQueue(q) => Action::SetQueue(q),
            OxmAction::Group(id) => Action::Group(id),
            OxmAction::PushVlan { ethertype } => Action::PushVlan { ethertype },
            OxmAction::PopVlan => Action::PopVlan,
            OxmAction::SetVlanVid(v) => Action::SetVlanVid(v),
            OxmAction::SetVlanPcp(p) => Action::SetVlanPcp(p),
            OxmAction::SetEthSrc(m) => Action::SetEthSrc(m),
            OxmAction::SetEthDst(m) => Action::SetEthDst(m),
            OxmAction::SetIpv4Src(a) => Action::SetIpv4Src(a.into()),
            OxmAction::SetIpv4Dst(a) => Action::SetIpv4Dst(a.into()),
            OxmAction::SetIpDscp(d) => Action::SetIpDscp(d),
            OxmAction::SetTcpSrc(p) => Action::SetTcpSrc(p),
            OxmAction::SetTcpDst(p) => Action::SetTcpDst(p),
            OxmAction::SetUdpSrc(p) => Action::SetUdpSrc(p),
            OxmAction::SetUdpDst(p) => Action::SetUdpDst(p),
            OxmAction::SetSctpSrc(p) => Action::SetSctpSrc(p),
            OxmAction::SetSctpDst(p) => Action::SetSctpDst(p),
            OxmAction::SetMplsTtl(t) => Action::SetMplsTtl(t),
            OxmAction::DecMplsTtl => Action::DecMplsTtl,
            OxmAction::SetNwTtl(t) => Action::SetNwTtl(t),
            OxmAction::DecNwTtl => Action::DecNwTtl,
            OxmAction::CopyTtlOut => Action::CopyTtlOut,
            OxmAction::CopyTtlIn => Action::CopyTtlIn,
            OxmAction::Drop => Action::Drop,
        }
    }
}

impl From<&Action> for OxmAction {
    fn from(value: &Action) -> Self {
        match *value {
            Action::Output { port, max_len } => OxmAction::Output { port, max_len },
            Action::SetQueue(q) => OxmAction::SetQueue(q),
            Action::Group(id) => OxmAction::Group(id),
            Action::PushVlan { ethertype } => OxmAction::PushVlan { ethertype },
            Action::PopVlan => OxmAction::PopVlan,
            Action::SetVlanVid(v) => OxmAction::SetVlanVid(v),
            Action::SetVlanPcp(p) => OxmAction::SetVlanPcp(p),
            Action::SetEthSrc(m) => OxmAction::SetEthSrc(m),
            Action::SetEthDst(m) => OxmAction::SetEthDst(m),
            Action::SetIpv4Src(a) => OxmAction::SetIpv4Src(a.into()),
            Action::SetIpv4Dst(a) => OxmAction::SetIpv4Dst(a.into()),
            Action::SetIpDscp(d) => OxmAction::SetIpDscp(d),
            Action::SetTcpSrc(p) => OxmAction::SetTcpSrc(p),
            Action::SetTcpDst(p) => OxmAction::SetTcpDst(p),
            Action::SetUdpSrc(p) => OxmAction::SetUdpSrc(p),
            Action::SetUdpDst(p) => OxmAction::SetUdpDst(p),
            Action::SetSctpSrc(p) => OxmAction::SetSctpSrc(p),
            Action::SetSctpDst(p) => OxmAction::SetSctpDst(p),
            Action::SetMplsTtl(t) => OxmAction::SetMplsTtl(t),
            Action::DecMplsTtl => OxmAction::DecMplsTtl,
            Action::SetNwTtl(t) => OxmAction::SetNwTtl(t),
            Action::DecNwTtl => OxmAction::DecNwTtl,
            Action::CopyTtlOut => OxmAction::CopyTtlOut,
            Action::CopyTtlIn => OxmAction::CopyTtlIn,
            Action::Drop => OxmAction::Drop,
        }
    }
}

/// Decode a controller's action list. Set-field actions targeting a layer
/// absent from a given packet are not rejected here — that's a runtime drop
/// at execution time (§4.8), not a translation-time error.
#[must_use]
pub fn translate_actions(actions: &[OxmAction]) -> Vec<Action> {
    actions.iter().copied().map(Action::from).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vlan_vid_none_decodes_to_no_tag() {
        assert_eq!(decode_vlan_vid(OFPVID_NONE, 0xffff).unwrap(), VidPresence::None);
    }

    #[test]
    fn vlan_vid_present_mask_decodes_to_any_vlan() {
        assert_eq!(decode_vlan_vid(OFPVID_PRESENT, OFPVID_PRESENT).unwrap(), VidPresence::Present);
    }

    #[test]
    fn vlan_vid_specific_value_decodes_to_that_vid() {
        assert_eq!(
            decode_vlan_vid(OFPVID_PRESENT | 42, 0xffff).unwrap(),
            VidPresence::Specific(42)
        );
    }

    #[test]
    fn vlan_vid_unrepresentable_combination_errors() {
        let err = decode_vlan_vid(0x0042, 0x00ff).unwrap_err();
        assert_eq!(
            err,
            TranslationError::ImpossibleVlanEncoding {
                value: 0x0042,
                mask: 0x00ff
            }
        );
    }

    #[test]
    fn translate_match_collects_every_field() {
        let fields = vec![OxmField::InPort(3), OxmField::EthType(0x0800), OxmField::IpProto(17)];
        let m = translate_match(&fields).unwrap();
        assert_eq!(m.in_port, Some(3));
        assert_eq!(m.eth_type, Some(0x0800));
        assert_eq!(m.ip_proto, Some(17));
    }

    #[test]
    fn action_round_trips_through_oxm_encoding() {
        let action = Action::SetTcpDst(443);
        let encoded = OxmAction::from(&action);
        let decoded: Action = encoded.into();
        assert_eq!(decoded, action);
    }

    #[test]
    fn translate_match_collects_arp_and_sctp_fields() {
        let fields = vec![
            OxmField::ArpOp(1),
            OxmField::ArpSpa { value: 0x0a000001, mask: u32::MAX },
            OxmField::SctpDst(4000),
            OxmField::Icmpv4Type(8),
        ];
        let m = translate_match(&fields).unwrap();
        assert_eq!(m.arp_op, Some(1));
        assert_eq!(m.arp_spa, Some(FieldMatch { value: 0x0a000001, mask: u32::MAX }));
        assert_eq!(m.sctp_dst, Some(4000));
        assert_eq!(m.icmpv4_type, Some(8));
    }

    #[test]
    fn sctp_action_round_trips_through_oxm_encoding() {
        let action = Action::SetSctpSrc(5000);
        let encoded = OxmAction::from(&action);
        let decoded: Action = encoded.into();
        assert_eq!(decoded, action);
    }

    #[test]
    fn translate_actions_preserves_order() {
        let list = vec![OxmAction::SetQueue(1), OxmAction::Output { port: 2, max_len: None }];
        let actions = translate_actions(&list);
        assert_eq!(actions, vec![Action::SetQueue(1), Action::Output { port: 2, max_len: None }]);
    }
}
