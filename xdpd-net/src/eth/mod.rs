// SPDX-License-Identifier: Apache-2.0

//! Ethernet header parsing and rewriting.

pub mod mac;

pub use mac::Mac;

use etherparse::{EtherType, Ethernet2Header};
use thiserror::Error;

/// A parsed Ethernet header, the always-present base of [`crate::Headers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eth {
    inner: Ethernet2Header,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EthError {
    #[error("frame shorter than an Ethernet header ({0} bytes)")]
    TooShort(usize),
}

impl Eth {
    pub const HEADER_LEN: usize = Ethernet2Header::LEN;

    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), EthError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(EthError::TooShort(bytes.len()));
        }
        let (inner, rest) = Ethernet2Header::from_slice(bytes).map_err(|_| EthError::TooShort(bytes.len()))?;
        Ok((Eth { inner }, rest))
    }

    #[must_use]
    pub fn source(&self) -> Mac {
        Mac(self.inner.source)
    }

    #[must_use]
    pub fn destination(&self) -> Mac {
        Mac(self.inner.destination)
    }

    pub fn set_source(&mut self, mac: Mac) {
        self.inner.source = mac.0;
    }

    pub fn set_destination(&mut self, mac: Mac) {
        self.inner.destination = mac.0;
    }

    #[must_use]
    pub fn ether_type(&self) -> EtherType {
        self.inner.ether_type
    }

    pub fn set_ether_type(&mut self, ether_type: EtherType) {
        self.inner.ether_type = ether_type;
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), EthError> {
        if out.len() < Self::HEADER_LEN {
            return Err(EthError::TooShort(out.len()));
        }
        out[..Self::HEADER_LEN].copy_from_slice(&self.inner.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut v = vec![0u8; 64];
        v[0..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        v[6..12].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        v[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
        v
    }

    #[test]
    fn parses_destination_source_and_type() {
        let bytes = sample();
        let (eth, rest) = Eth::parse(&bytes).unwrap();
        assert_eq!(eth.destination(), Mac([1, 2, 3, 4, 5, 6]));
        assert_eq!(eth.source(), Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        assert_eq!(eth.ether_type(), EtherType::IPV4);
        assert_eq!(rest.len(), bytes.len() - Eth::HEADER_LEN);
    }

    #[test]
    fn rejects_short_frames() {
        let short = [0u8; 10];
        assert_eq!(Eth::parse(&short).unwrap_err(), EthError::TooShort(10));
    }

    #[test]
    fn set_destination_round_trips_through_write() {
        let bytes = sample();
        let (mut eth, _) = Eth::parse(&bytes).unwrap();
        eth.set_destination(Mac::BROADCAST);
        let mut out = vec![0u8; Eth::HEADER_LEN];
        eth.write(&mut out).unwrap();
        let (reparsed, _) = Eth::parse(&out).unwrap();
        assert_eq!(reparsed.destination(), Mac::BROADCAST);
    }
}
