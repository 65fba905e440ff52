// SPDX-License-Identifier: Apache-2.0

//! TCP header: ports and flags, the slice the match engine and set-field
//! action handlers need.

use etherparse::TcpHeader;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TcpError {
    #[error("frame too short to contain a TCP header ({0} bytes)")]
    TooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tcp {
    inner: TcpHeader,
}

impl Tcp {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), TcpError> {
        let (inner, rest) = TcpHeader::from_slice(bytes).map_err(|_| TcpError::TooShort(bytes.len()))?;
        Ok((Tcp { inner }, rest))
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

    pub fn write(&self, out: &mut [u8]) -> Result<(), TcpError> {
        let len = self.inner.header_len() as usize;
        if out.len() < len {
            return Err(TcpError::TooShort(out.len()));
        }
        let mut cursor = std::io::Cursor::new(&mut out[..len]);
        self.inner.write(&mut cursor).map_err(|_| TcpError::TooShort(out.len()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<u8> {
        let header = TcpHeader::new(1000, 2000, 0, 1024);
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        out
    }

    #[test]
    fn parses_ports() {
        let (tcp, _) = Tcp::parse(&sample()).unwrap();
        assert_eq!(tcp.source_port(), 1000);
        assert_eq!(tcp.destination_port(), 2000);
    }

    #[test]
    fn set_destination_port_round_trips_through_write() {
        let (mut tcp, _) = Tcp::parse(&sample()).unwrap();
        tcp.set_destination_port(53);
        let mut out = vec![0u8; 20];
        tcp.write(&mut out).unwrap();
        let (reparsed, _) = Tcp::parse(&out).unwrap();
        assert_eq!(reparsed.destination_port(), 53);
    }
}
