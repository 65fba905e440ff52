// SPDX-License-Identifier: Apache-2.0

//! ARP (RFC 826), scoped to the Ethernet/IPv4 case the match engine and
//! classifier need: operation, sender/target hardware and protocol
//! addresses. Hand-rolled rather than routed through `etherparse`, which
//! (like [`crate::vlan`]) has no ARP header type of its own.

use thiserror::Error;

use crate::eth::Mac;

pub const HEADER_LEN: usize = 28;

const ETHERNET_HTYPE: u16 = 1;
const IPV4_PTYPE: u16 = 0x0800;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArpError {
    #[error("frame too short to contain an ARP header ({0} bytes)")]
    TooShort(usize),
    #[error("unsupported hardware/protocol type combination (htype {htype}, ptype 0x{ptype:04x})")]
    Unsupported { htype: u16, ptype: u16 },
}

/// `ARP_OP`: request or reply, the only two operations OpenFlow's ARP OXMs
/// distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Request,
    Reply,
    /// Any other `oper` value (RARP, InARP, ...), carried through unmatched.
    Other(u16),
}

impl Operation {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Operation::Request => 1,
            Operation::Reply => 2,
            Operation::Other(code) => code,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Operation::Request,
            2 => Operation::Reply,
            other => Operation::Other(other),
        }
    }
}

/// A parsed Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arp {
    pub operation: Operation,
    pub sender_mac: Mac,
    pub sender_ip: std::net::Ipv4Addr,
    pub target_mac: Mac,
    pub target_ip: std::net::Ipv4Addr,
}

impl Arp {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), ArpError> {
        if bytes.len() < HEADER_LEN {
            return Err(ArpError::TooShort(bytes.len()));
        }
        let htype = u16::from_be_bytes([bytes[0], bytes[1]]);
        let ptype = u16::from_be_bytes([bytes[2], bytes[3]]);
        let hlen = bytes[4];
        let plen = bytes[5];
        if htype != ETHERNET_HTYPE || ptype != IPV4_PTYPE || hlen != 6 || plen != 4 {
            return Err(ArpError::Unsupported { htype, ptype });
        }
        let operation = Operation::from_code(u16::from_be_bytes([bytes[6], bytes[7]]));
        let sender_mac = Mac([bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13]]);
        let sender_ip = std::net::Ipv4Addr::new(bytes[14], bytes[15], bytes[16], bytes[17]);
        let target_mac = Mac([bytes[18], bytes[19], bytes[20], bytes[21], bytes[22], bytes[23]]);
        let target_ip = std::net::Ipv4Addr::new(bytes[24], bytes[25], bytes[26], bytes[27]);
        Ok((
            Arp {
                operation,
                sender_mac,
                sender_ip,
                target_mac,
                target_ip,
            },
            &bytes[HEADER_LEN..],
        ))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&ETHERNET_HTYPE.to_be_bytes());
        out[2..4].copy_from_slice(&IPV4_PTYPE.to_be_bytes());
        out[4] = 6;
        out[5] = 4;
        out[6..8].copy_from_slice(&self.operation.code().to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.octets());
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.octets());
        out
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), ArpError> {
        if out.len() < HEADER_LEN {
            return Err(ArpError::TooShort(out.len()));
        }
        out[..HEADER_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}
