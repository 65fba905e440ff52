// SPDX-License-Identifier: Apache-2.0

//! UDP header: ports and length, the slice the match engine and set-field
//! action handlers need.

use etherparse::UdpHeader;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UdpError {
    #[error("frame too short to contain a UDP header ({0} bytes)")]
    TooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Udp {
    inner: UdpHeader,
}

impl Udp {
    pub const HEADER_LEN: usize = UdpHeader::LEN;

    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), UdpError> {
        let (inner, rest) = UdpHeader::from_slice(bytes).map_err(|_| UdpError::TooShort(bytes.len()))?;
        Ok((Udp { inner }, rest))
    }

    #[must_use]
    pub fn source_port(&self) -> u16 {
        self.inner.source_port
    }

    #[must_use]
    pub fn destination_port(&self) -> u16 {
        self.inner.destination_port
    }

    pub fn set_source_port(&mut self, port: u16) {
        self.inner.source_port = port;
    }

    pub fn set_destination_port(&mut self, port: u16) {
        self.inner.destination_port = port;
    }

    #[must_use]
    pub fn length(&self) -> u16 {
        self.inner.length
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), UdpError> {
        if out.len() < Self::HEADER_LEN {
            return Err(UdpError::TooShort(out.len()));
        }
        out[..Self::HEADER_LEN].copy_from_slice(&self.inner.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<u8> {
        UdpHeader::without_ipv4_checksum(1000, 2000, 7).unwrap().to_bytes().to_vec()
    }

    #[test]
    fn parses_ports_and_length() {
        let (udp, _) = Udp::parse(&sample()).unwrap();
        assert_eq!(udp.source_port(), 1000);
        assert_eq!(udp.destination_port(), 2000);
        assert_eq!(udp.length(), 8 + 7);
    }

    #[test]
    fn set_source_port_round_trips_through_write() {
        let (mut udp, _) = Udp::parse(&sample()).unwrap();
        udp.set_source_port(53);
        let mut out = vec![0u8; Udp::HEADER_LEN];
        udp.write(&mut out).unwrap();
        let (reparsed, _) = Udp::parse(&out).unwrap();
        assert_eq!(reparsed.source_port(), 53);
    }
}
