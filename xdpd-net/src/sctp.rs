// SPDX-License-Identifier: Apache-2.0

//! SCTP (RFC 4960) common header: source/destination ports and the
//! verification tag, scoped to what the match engine needs. The chunk
//! sequence that follows is left in the remainder slice uninterpreted.

use thiserror::Error;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SctpError {
    #[error("frame too short to contain an SCTP common header ({0} bytes)")]
    TooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sctp {
    source_port: u16,
    destination_port: u16,
    verification_tag: u32,
    checksum: u32,
}

impl Sctp {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), SctpError> {
        if bytes.len() < HEADER_LEN {
            return Err(SctpError::TooShort(bytes.len()));
        }
        Ok((
            Sctp {
                source_port: u16::from_be_bytes([bytes[0], bytes[1]]),
                destination_port: u16::from_be_bytes([bytes[2], bytes[3]]),
                verification_tag: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
                checksum: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            },
            &bytes[HEADER_LEN..],
        ))
    }

    #[must_use]
    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    #[must_use]
    pub fn destination_port(&self) -> u16 {
        self.destination_port
    }

    pub fn set_source_port(&mut self, port: u16) {
        self.source_port = port;
    }

    pub fn set_destination_port(&mut self, port: u16) {
        self.destination_port = port;
    }

    #[must_use]
    pub fn verification_tag(&self) -> u32 {
        self.verification_tag
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn set_checksum(&mut self, checksum: u32) {
        self.checksum = checksum;
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.verification_tag.to_be_bytes());
        out[8..12].copy_from_slice(&self.checksum.to_be_bytes());
        out
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), SctpError> {
        if out.len() < HEADER_LEN {
            return Err(SctpError::TooShort(out.len()));
        }
        out[..HEADER_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Sctp {
        Sctp {
            source_port: 1000,
            destination_port: 2000,
            verification_tag: 0xdead_beef,
            checksum: 0,
        }
    }

    #[test]
    fn round_trips_ports_and_tag() {
        let sctp = sample();
        let (reparsed, rest) = Sctp::parse(&sctp.to_bytes()).unwrap();
        assert_eq!(reparsed, sctp);
        assert!(rest.is_empty());
    }

    #[test]
    fn set_source_port_round_trips_through_write() {
        let mut sctp = sample();
        sctp.set_source_port(53);
        let mut out = vec![0u8; HEADER_LEN];
        sctp.write(&mut out).unwrap();
        let (reparsed, _) = Sctp::parse(&out).unwrap();
        assert_eq!(reparsed.source_port(), 53);
    }

    #[test]
    fn rejects_short_frames() {
        assert_eq!(Sctp::parse(&[0u8; 4]).unwrap_err(), SctpError::TooShort(4));
    }
}
