// SPDX-License-Identifier: Apache-2.0

//! IPv4/IPv6 headers, scoped to what the match engine and action executor
//! need: addresses, protocol/next-header, DSCP/ECN, TTL/hop limit.

use etherparse::{Ipv4Header, Ipv6Header};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpError {
    #[error("frame too short to contain an IPv4 header ({0} bytes)")]
    V4TooShort(usize),
    #[error("frame too short to contain an IPv6 header ({0} bytes)")]
    V6TooShort(usize),
    #[error("unsupported IP version nibble {0}")]
    UnsupportedVersion(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ip {
    V4(Ipv4),
    V6(Ipv6),
}

impl Ip {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), IpError> {
        match bytes.first() {
            Some(b) if b >> 4 == 4 => {
                let (v4, rest) = Ipv4::parse(bytes)?;
                Ok((Ip::V4(v4), rest))
            }
            Some(b) if b >> 4 == 6 => {
                let (v6, rest) = Ipv6::parse(bytes)?;
                Ok((Ip::V6(v6), rest))
            }
            Some(b) => Err(IpError::UnsupportedVersion(b >> 4)),
            None => Err(IpError::V4TooShort(0)),
        }
    }

    #[must_use]
    pub fn protocol(&self) -> u8 {
        match self {
            Ip::V4(v4) => v4.inner.protocol.0,
            Ip::V6(v6) => v6.inner.next_header.0,
        }
    }

    #[must_use]
    pub fn dscp(&self) -> u8 {
        match self {
            Ip::V4(v4) => v4.inner.dscp.into(),
            Ip::V6(v6) => v6.inner.traffic_class >> 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4 {
    inner: Ipv4Header,
}

impl Ipv4 {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), IpError> {
        let (inner, rest) = Ipv4Header::from_slice(bytes).map_err(|_| IpError::V4TooShort(bytes.len()))?;
        Ok((Ipv4 { inner }, rest))
    }

    #[must_use]
    pub fn source(&self) -> std::net::Ipv4Addr {
        self.inner.source.into()
    }

    #[must_use]
    pub fn destination(&self) -> std::net::Ipv4Addr {
        self.inner.destination.into()
    }

    pub fn set_source(&mut self, addr: std::net::Ipv4Addr) {
        self.inner.source = addr.octets();
    }

    pub fn set_destination(&mut self, addr: std::net::Ipv4Addr) {
        self.inner.destination = addr.octets();
    }

    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.inner.time_to_live
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.inner.time_to_live = ttl;
    }

    #[must_use]
    pub fn total_len(&self) -> u16 {
        self.inner.total_len
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), IpError> {
        let len = self.inner.header_len();
        if out.len() < len {
            return Err(IpError::V4TooShort(out.len()));
        }
        let mut cursor = std::io::Cursor::new(&mut out[..len]);
        self.inner
            .write(&mut cursor)
            .map_err(|_| IpError::V4TooShort(out.len()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6 {
    inner: Ipv6Header,
}

impl Ipv6 {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), IpError> {
        let (inner, rest) = Ipv6Header::from_slice(bytes).map_err(|_| IpError::V6TooShort(bytes.len()))?;
        Ok((Ipv6 { inner }, rest))
    }

    #[must_use]
    pub fn source(&self) -> std::net::Ipv6Addr {
        self.inner.source.into()
    }

    #[must_use]
    pub fn destination(&self) -> std::net::Ipv6Addr {
        self.inner.destination.into()
    }

    #[must_use]
    pub fn hop_limit(&self) -> u8 {
        self.inner.hop_limit
    }

    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.inner.hop_limit = hop_limit;
    }
}
