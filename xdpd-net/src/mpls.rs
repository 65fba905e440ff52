// SPDX-License-Identifier: Apache-2.0

//! MPLS (RFC 3032) label stack entries: one 4-byte shim between the
//! Ethernet header and the original payload per push, carrying the label,
//! traffic class, bottom-of-stack bit, and TTL that `SET_MPLS_TTL`/
//! `DEC_MPLS_TTL` operate on.

use thiserror::Error;

pub const LABEL_LEN: usize = 4;

pub const UNICAST_ETHERTYPE: u16 = 0x8847;
pub const MULTICAST_ETHERTYPE: u16 = 0x8848;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MplsError {
    #[error("frame too short to contain an MPLS label ({0} bytes)")]
    TooShort(usize),
}

/// One label stack entry. `bos` (bottom-of-stack) is true for the innermost
/// label, after which the original Ethertype payload resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MplsLabel {
    pub label: u32,
    pub traffic_class: u8,
    pub bos: bool,
    pub ttl: u8,
}

impl MplsLabel {
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), MplsError> {
        if bytes.len() < LABEL_LEN {
            return Err(MplsError::TooShort(bytes.len()));
        }
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok((
            MplsLabel {
                label: word >> 12,
                traffic_class: ((word >> 9) & 0x7) as u8,
                bos: (word >> 8) & 0x1 != 0,
                ttl: (word & 0xFF) as u8,
            },
            &bytes[LABEL_LEN..],
        ))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; LABEL_LEN] {
        let word = ((self.label & 0x000f_ffff) << 12) | (u32::from(self.traffic_class & 0x7) << 9) | (u32::from(self.bos) << 8) | u32::from(self.ttl);
        word.to_be_bytes()
    }

    pub fn write(&self, out: &mut [u8]) -> Result<(), MplsError> {
        if out.len() < LABEL_LEN {
            return Err(MplsError::TooShort(out.len()));
        }
        out[..LABEL_LEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }
}
