// SPDX-License-Identifier: Apache-2.0

//! ICMPv4 (RFC 792) and ICMPv6 (RFC 4443) headers, scoped to the fields the
//! match engine needs: type and code. The variable payload that follows
//! (echo identifier/sequence, unreachable-reason data, ...) is left in the
//! remainder slice for whoever needs it rather than modeled here.

use thiserror::Error;

pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IcmpError {
    #[error("frame too short to contain an ICMP header ({0} bytes)")]
    TooShort(usize),
}

/// ICMPv4 type/code, carried over IP protocol 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv4 {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl Icmpv4 {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), IcmpError> {
        if bytes.len() < HEADER_LEN {
            return Err(IcmpError::TooShort(bytes.len()));
        }
        Ok((
            Icmpv4 {
                icmp_type: bytes[0],
                code: bytes[1],
                checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            },
            &bytes[HEADER_LEN..],
        ))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.icmp_type;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), IcmpError> {
        if out.len() < HEADER_LEN {
            return Err(IcmpError::TooShort(out.len()));
        }
        out[..HEADER_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}

/// ICMPv6 type/code, carried over IPv6 next-header 58.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv6 {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl Icmpv6 {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), IcmpError> {
        if bytes.len() < HEADER_LEN {
            return Err(IcmpError::TooShort(bytes.len()));
        }
        Ok((
            Icmpv6 {
                icmp_type: bytes[0],
                code: bytes[1],
                checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            },
            &bytes[HEADER_LEN..],
        ))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.icmp_type;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), IcmpError> {
        if out.len() < HEADER_LEN {
            return Err(IcmpError::TooShort(out.len()));
        }
        out[..HEADER_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v4_echo_request_round_trips() {
        let icmp = Icmpv4 {
            icmp_type: 8,
            code: 0,
            checksum: 0xbeef,
        };
        let (reparsed, rest) = Icmpv4::parse(&icmp.to_bytes()).unwrap();
        assert_eq!(reparsed, icmp);
        assert!(rest.is_empty());
    }

    #[test]
    fn v6_neighbor_solicitation_round_trips() {
        let icmp = Icmpv6 {
            icmp_type: 135,
            code: 0,
            checksum: 0x1234,
        };
        let (reparsed, _) = Icmpv6::parse(&icmp.to_bytes()).unwrap();
        assert_eq!(reparsed, icmp);
    }

    #[test]
    fn rejects_short_frames() {
        assert_eq!(Icmpv4::parse(&[0u8; 2]).unwrap_err(), IcmpError::TooShort(2));
        assert_eq!(Icmpv6::parse(&[0u8; 2]).unwrap_err(), IcmpError::TooShort(2));
    }
}
