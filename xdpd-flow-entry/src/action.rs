// SPDX-License-Identifier: Apache-2.0

//! Action set: the operations a flow entry's instructions can apply to a
//! packet (§4.6 "Action executor").

use xdpd_net::eth::Mac;

/// A single action. `OFPAT_EXPERIMENTER`/vendor extensions are out of
/// scope (§1 Non-goals); every action OpenFlow 1.0-1.3 require for a
/// conformant output/forwarding path is represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Output { port: u32, max_len: Option<u16> },
    SetQueue(u32),
    Group(u32),
    PushVlan { ethertype: u16 },
    PopVlan,
    SetVlanVid(u16),
    SetVlanPcp(u8),
    SetEthSrc(Mac),
    SetEthDst(Mac),
    SetIpv4Src(std::net::Ipv4Addr),
    SetIpv4Dst(std::net::Ipv4Addr),
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

impl Action {
    /// Ordinal used to implement "one instance per kind" semantics for an
    /// `APPLY_ACTIONS`/`WRITE_ACTIONS` set, mirroring the controller's own
    /// view that e.g. two `SetEthSrc` actions in one write-actions set
    /// collapse to the last writer.
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            Action::Output { .. } => 0,
            Action::SetQueue(_) => 1,
            Action::Group(_) => 2,
            Action::PushVlan { .. } => 3,
            Action::PopVlan => 4,
            Action::SetVlanVid(_) => 5,
            Action::SetVlanPcp(_) => 6,
            Action::SetEthSrc(_) => 7,
            Action::SetEthDst(_) => 8,
            Action::SetIpv4Src(_) => 9,
            Action::SetIpv4Dst(_) => 10,
            Action::SetIpDscp(_) => 11,
            Action::SetTcpSrc(_) => 12,
            Action::SetTcpDst(_) => 13,
            Action::SetUdpSrc(_) => 14,
            Action::SetUdpDst(_) => 15,
            Action::SetSctpSrc(_) => 16,
            Action::SetSctpDst(_) => 17,
            Action::SetMplsTtl(_) => 18,
            Action::DecMplsTtl => 19,
            Action::SetNwTtl(_) => 20,
            Action::DecNwTtl => 21,
            Action::CopyTtlOut => 22,
            Action::CopyTtlIn => 23,
            Action::Drop => 24,
        }
    }
}
