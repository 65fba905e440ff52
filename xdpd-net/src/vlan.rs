// SPDX-License-Identifier: Apache-2.0

//! VLAN tag model, including the kernel out-of-band materialization
//! described in §4.2(d): some ring drivers strip the VLAN tag from the wire
//! bytes and report it separately (`tp_vlan_tci`/`tp_vlan_tpid`); the
//! classifier must synthesize an equivalent in-buffer tag before the
//! pipeline ever sees the frame.

use thiserror::Error;

/// Tag protocol identifier: customer tag (802.1Q) or service tag (802.1ad).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tpid {
    /// 0x8100 — C-TAG (customer VLAN tag).
    CTag,
    /// 0x88a8 — S-TAG (service/provider VLAN tag, 802.1ad QinQ outer tag).
    STag,
}

impl Tpid {
    pub const CTAG_ETHERTYPE: u16 = 0x8100;
    pub const STAG_ETHERTYPE: u16 = 0x88a8;

    #[must_use]
    pub const fn ethertype(self) -> u16 {
        match self {
            Tpid::CTag => Self::CTAG_ETHERTYPE,
            Tpid::STag => Self::STAG_ETHERTYPE,
        }
    }

    #[must_use]
    pub const fn from_ethertype(ethertype: u16) -> Option<Self> {
        match ethertype {
            Self::CTAG_ETHERTYPE => Some(Tpid::CTag),
            Self::STAG_ETHERTYPE => Some(Tpid::STag),
            _ => None,
        }
    }
}

/// The VLAN_VID wire presence encoding, per §4.8: the controller may send
/// "no VLAN", "any VLAN", or a specific VID, and these are not representable
/// as a plain (value, mask) pair without a dedicated enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VidPresence {
    /// `OFPVID_NONE` with an exact mask: the packet must carry no VLAN tag.
    None,
    /// `OFPVID_PRESENT` with mask `OFPVID_PRESENT`: any VID, tag must be present.
    Present,
    /// A specific VID (0..=4095) that must be present and match.
    Specific(u16),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VidEncodingError {
    #[error("VID value 0x{value:04x} with mask 0x{mask:04x} is not a representable presence encoding")]
    Impossible { value: u16, mask: u16 },
}

const OFPVID_PRESENT: u16 = 0x1000;
const OFPVID_NONE: u16 = 0x0000;

impl VidPresence {
    /// Decode the wire (value, mask) pair per the rules in §4.8.
    pub fn decode(value: u16, mask: u16) -> Result<Self, VidEncodingError> {
        if value == OFPVID_NONE && mask == 0xFFFF {
            return Ok(VidPresence::None);
        }
        if value == OFPVID_PRESENT && mask == OFPVID_PRESENT {
            return Ok(VidPresence::Present);
        }
        if value & OFPVID_PRESENT != 0 && mask & OFPVID_PRESENT != 0 {
            return Ok(VidPresence::Specific(value & 0x0FFF));
        }
        Err(VidEncodingError::Impossible { value, mask })
    }

    /// Canonical (value, mask) encoding for stats replies (§4.8: action and
    /// match translation must be symmetric).
    #[must_use]
    pub fn encode(self) -> (u16, u16) {
        match self {
            VidPresence::None => (OFPVID_NONE, 0xFFFF),
            VidPresence::Present => (OFPVID_PRESENT, OFPVID_PRESENT),
            VidPresence::Specific(vid) => (OFPVID_PRESENT | (vid & 0x0FFF), 0xFFFF),
        }
    }
}

/// A parsed 802.1Q/802.1ad VLAN tag: TPID + TCI (PCP, DEI, VID).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vlan {
    pub tpid: Tpid,
    pub pcp: u8,
    pub dei: bool,
    pub vid: u16,
}

pub const VLAN_HEADER_LEN: usize = 4;

impl Vlan {
    /// Build the in-buffer tag from ring-reported out-of-band metadata
    /// (`tp_vlan_tci`, and `tp_vlan_tpid` when the kernel reports S-TAG
    /// frames; absent that, C-TAG is assumed).
    #[must_use]
    pub fn from_ring_metadata(tci: u16, tpid_ethertype: Option<u16>) -> Self {
        let tpid = tpid_ethertype
            .and_then(Tpid::from_ethertype)
            .unwrap_or(Tpid::CTag);
        Vlan {
            tpid,
            pcp: ((tci >> 13) & 0x7) as u8,
            dei: (tci >> 12) & 0x1 != 0,
            vid: tci & 0x0FFF,
        }
    }

    #[must_use]
    pub fn tci(self) -> u16 {
        (u16::from(self.pcp) << 13) | (u16::from(self.dei) << 12) | (self.vid & 0x0FFF)
    }

    /// Serialize as the 4-byte in-buffer tag (TPID + TCI), to be spliced in
    /// right after the source MAC.
    #[must_use]
    pub fn to_bytes(self) -> [u8; VLAN_HEADER_LEN] {
        let mut out = [0u8; VLAN_HEADER_LEN];
        out[0..2].copy_from_slice(&self.tpid.ethertype().to_be_bytes());
        out[2..4].copy_from_slice(&self.tci().to_be_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < VLAN_HEADER_LEN {
            return None;
        }
        let ethertype = u16::from_be_bytes([bytes[0], bytes[1]]);
        let tpid = Tpid::from_ethertype(ethertype)?;
        let tci = u16::from_be_bytes([bytes[2], bytes[3]]);
        Some((
            Vlan {
                tpid,
                pcp: ((tci >> 13) & 0x7) as u8,
                dei: (tci >> 12) & 0x1 != 0,
                vid: tci & 0x0FFF,
            },
            &bytes[VLAN_HEADER_LEN..],
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ring_metadata_round_trips_ctag() {
        let tci = (3u16 << 13) | (1 << 12) | 100;
        let vlan = Vlan::from_ring_metadata(tci, None);
        assert_eq!(vlan.tpid, Tpid::CTag);
        assert_eq!(vlan.pcp, 3);
        assert!(vlan.dei);
        assert_eq!(vlan.vid, 100);
        assert_eq!(vlan.tci(), tci);
    }

    #[test]
    fn ring_metadata_preserves_stag() {
        let vlan = Vlan::from_ring_metadata(42, Some(Tpid::STAG_ETHERTYPE));
        assert_eq!(vlan.tpid, Tpid::STag);
        assert_eq!(vlan.vid, 42);
    }

    #[test]
    fn serialized_tag_reparses_identically() {
        let vlan = Vlan {
            tpid: Tpid::STag,
            pcp: 5,
            dei: false,
            vid: 200,
        };
        let bytes = vlan.to_bytes();
        let (reparsed, rest) = Vlan::parse(&bytes).unwrap();
        assert_eq!(reparsed, vlan);
        assert!(rest.is_empty());
    }

    #[test]
    fn vid_presence_decodes_none_present_and_specific() {
        assert_eq!(VidPresence::decode(0, 0xFFFF).unwrap(), VidPresence::None);
        assert_eq!(
            VidPresence::decode(OFPVID_PRESENT, OFPVID_PRESENT).unwrap(),
            VidPresence::Present
        );
        assert_eq!(
            VidPresence::decode(OFPVID_PRESENT | 7, 0xFFFF).unwrap(),
            VidPresence::Specific(7)
        );
    }

    #[test]
    fn vid_presence_rejects_impossible_combination() {
        assert!(VidPresence::decode(7, 0x0FFF).is_err());
    }

    #[test]
    fn vid_presence_encode_decode_round_trips() {
        for p in [
            VidPresence::None,
            VidPresence::Present,
            VidPresence::Specific(4095),
        ] {
            let (value, mask) = p.encode();
            assert_eq!(VidPresence::decode(value, mask).unwrap(), p);
        }
    }
}
