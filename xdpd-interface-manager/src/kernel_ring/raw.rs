// SPDX-License-Identifier: Apache-2.0

//! The only `unsafe` in this crate: a TPACKET_V2 mmap'd RX/TX ring over
//! AF_PACKET (§6.3 "NIC boundary"). Everything outside this module touches
//! frames through safe accessor methods; no raw pointer ever escapes.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr::NonNull;

const TPACKET_V2: libc::c_int = 1;
const PACKET_VERSION: libc::c_int = 10;
const PACKET_RX_RING: libc::c_int = 5;
const PACKET_TX_RING: libc::c_int = 13;

const TP_STATUS_KERNEL: u32 = 0;
const TP_STATUS_USER: u32 = 1 << 0;
const TP_STATUS_SEND_REQUEST: u32 = 1 << 0;
const TP_STATUS_AVAILABLE: u32 = 0;

/// `struct tpacket2_hdr` from `linux/if_packet.h`. 32 bytes, matching the
/// kernel's `TPACKET_ALIGN`ment for this header size.
#[repr(C)]
struct Tpacket2Hdr {
    tp_status: u32,
    tp_len: u32,
    tp_snaplen: u32,
    tp_mac: u16,
    tp_net: u16,
    tp_sec: u32,
    tp_nsec: u32,
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
    tp_padding: [u8; 4],
}

const HDR_LEN: usize = std::mem::size_of::<Tpacket2Hdr>();

#[repr(C)]
struct TpacketReq {
    tp_block_size: u32,
    tp_block_nr: u32,
    tp_frame_size: u32,
    tp_frame_nr: u32,
}

/// One RX or TX frame slot: a `tpacket2_hdr` followed by `frame_size -
/// HDR_LEN` bytes of (at steady state, ethernet-frame-shaped) payload
/// space, starting at `tp_mac` within the slot.
pub(crate) struct FrameSlot<'a> {
    base: &'a mut [u8],
}

impl<'a> FrameSlot<'a> {
    fn hdr(&self) -> &Tpacket2Hdr {
        unsafe { &*(self.base.as_ptr() as *const Tpacket2Hdr) }
    }

    fn hdr_mut(&mut self) -> &mut Tpacket2Hdr {
        unsafe { &mut *(self.base.as_mut_ptr() as *mut Tpacket2Hdr) }
    }

    #[must_use]
    pub(crate) fn is_ready_for_user(&self) -> bool {
        self.hdr().tp_status & TP_STATUS_USER != 0
    }

    #[must_use]
    pub(crate) fn snaplen(&self) -> u32 {
        self.hdr().tp_snaplen
    }

    #[must_use]
    pub(crate) fn vlan_tci(&self) -> Option<(u16, u16)> {
        let hdr = self.hdr();
        let tpid = if hdr.tp_vlan_tpid == 0 { 0x8100 } else { hdr.tp_vlan_tpid };
        (hdr.tp_vlan_tci != 0 || hdr.tp_vlan_tpid != 0).then_some((hdr.tp_vlan_tci, tpid))
    }

    /// True if this slot is a loopback copy of our own transmit (the
    /// kernel appends a `sockaddr_ll` right after the header, whose
    /// `sll_pkttype` is `PACKET_OUTGOING` for our own sent frames).
    #[must_use]
    pub(crate) fn is_outgoing(&self) -> bool {
        const PACKET_OUTGOING: u8 = 4;
        const SLL_PKTTYPE_OFFSET: usize = HDR_LEN + 2 + 2 + 4 + 2;
        self.base
            .get(SLL_PKTTYPE_OFFSET)
            .is_some_and(|b| *b == PACKET_OUTGOING)
    }

    /// Payload bytes, `tp_mac..tp_mac+tp_snaplen`.
    #[must_use]
    pub(crate) fn payload(&self) -> &[u8] {
        let hdr = self.hdr();
        let start = hdr.tp_mac as usize;
        let end = start + hdr.tp_snaplen as usize;
        &self.base[start..end.min(self.base.len())]
    }

    /// Return the slot to the kernel (RX) so it can reuse the buffer.
    pub(crate) fn release_to_kernel(&mut self) {
        self.hdr_mut().tp_status = TP_STATUS_KERNEL;
    }

    #[must_use]
    pub(crate) fn is_available_for_tx(&self) -> bool {
        self.hdr().tp_status == TP_STATUS_AVAILABLE
    }

    /// Write `frame` (a full Ethernet frame) into the slot and request the
    /// kernel send it.
    pub(crate) fn fill_for_tx(&mut self, frame: &[u8]) {
        let mac_offset = HDR_LEN;
        let end = mac_offset + frame.len();
        self.base[mac_offset..end].copy_from_slice(frame);
        let hdr = self.hdr_mut();
        hdr.tp_len = frame.len() as u32;
        hdr.tp_snaplen = frame.len() as u32;
        hdr.tp_status = TP_STATUS_SEND_REQUEST;
    }
}

pub(crate) struct RawRing {
    fd: RawFd,
    map: NonNull<u8>,
    map_len: usize,
    frame_size: u32,
    rx_frames: u32,
    tx_frames: u32,
    rx_cursor: u32,
    tx_cursor: u32,
}

unsafe impl Send for RawRing {}

impl RawRing {
    /// Open an AF_PACKET raw socket bound to `ifindex`, request a combined
    /// RX+TX ring of `frames_per_side` frames each `frame_size` bytes, and
    /// mmap it. `frame_size` must be a multiple of 16 (`TPACKET_ALIGNMENT`)
    /// and large enough to hold `HDR_LEN` plus the port's MTU + Ethernet
    /// overhead.
    pub(crate) fn open(ifindex: u32, frame_size: u32, frames_per_side: u32) -> io::Result<Self> {
        unsafe {
            let fd = libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            let req = TpacketReq {
                tp_block_size: frame_size,
                tp_block_nr: frames_per_side,
                tp_frame_size: frame_size,
                tp_frame_nr: frames_per_side,
            };
            if setsockopt_version(fd).is_err()
                || setsockopt_ring(fd, PACKET_RX_RING, &req).is_err()
                || setsockopt_ring(fd, PACKET_TX_RING, &req).is_err()
            {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            let map_len = (frame_size as usize) * (frames_per_side as usize) * 2;
            let map = libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if map == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            let mut sll: libc::sockaddr_ll = std::mem::zeroed();
            sll.sll_family = libc::AF_PACKET as u16;
            sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
            sll.sll_ifindex = ifindex as i32;
            let bind_result = libc::bind(
                fd,
                std::ptr::addr_of!(sll).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            );
            if bind_result != 0 {
                let err = io::Error::last_os_error();
                libc::munmap(map, map_len);
                libc::close(fd);
                return Err(err);
            }

            Ok(RawRing {
                fd,
                map: NonNull::new(map.cast::<u8>()).expect("mmap returned null without MAP_FAILED"),
                map_len,
                frame_size,
                rx_frames: frames_per_side,
                tx_frames: frames_per_side,
                rx_cursor: 0,
                tx_cursor: 0,
            })
        }
    }

    fn slot(&mut self, side_offset: usize, index: u32) -> FrameSlot<'_> {
        let offset = side_offset + (index as usize) * (self.frame_size as usize);
        let base = unsafe {
            std::slice::from_raw_parts_mut(self.map.as_ptr().add(offset), self.frame_size as usize)
        };
        FrameSlot { base }
    }

    /// The next ready RX slot, advancing the ring cursor, or `None` if the
    /// ring is caught up with the kernel.
    pub(crate) fn next_rx_ready(&mut self) -> Option<FrameSlot<'_>> {
        let idx = self.rx_cursor;
        let frame_size = self.frame_size;
        let frames = self.rx_frames;
        let ready = {
            let slot = self.slot(0, idx);
            slot.is_ready_for_user()
        };
        if !ready {
            return None;
        }
        self.rx_cursor = (idx + 1) % frames;
        let _ = frame_size;
        Some(self.slot(0, idx))
    }

    /// The next free TX slot to fill, or `None` if the TX ring is full
    /// (every slot still owned by the kernel).
    pub(crate) fn next_tx_free(&mut self) -> Option<FrameSlot<'_>> {
        let rx_side_len = (self.frame_size as usize) * (self.rx_frames as usize);
        let idx = self.tx_cursor;
        let frames = self.tx_frames;
        let available = {
            let slot = self.slot(rx_side_len, idx);
            slot.is_available_for_tx()
        };
        if !available {
            return None;
        }
        self.tx_cursor = (idx + 1) % frames;
        Some(self.slot(rx_side_len, idx))
    }

    /// Issue the batched send for every slot marked `TP_STATUS_SEND_REQUEST`.
    pub(crate) fn kick_tx(&self) -> io::Result<()> {
        let sent = unsafe { libc::send(self.fd, std::ptr::null(), 0, libc::MSG_DONTWAIT) };
        if sent < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN) || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

fn setsockopt_version(fd: RawFd) -> io::Result<()> {
    let version: libc::c_int = TPACKET_V2;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            PACKET_VERSION,
            std::ptr::addr_of!(version).cast(),
            std::mem::size_of::<libc::c_int>() as u32,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn setsockopt_ring(fd: RawFd, optname: libc::c_int, req: &TpacketReq) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            optname,
            std::ptr::addr_of!(*req).cast(),
            std::mem::size_of::<TpacketReq>() as u32,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl AsRawFd for RawRing {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for RawRing {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map.as_ptr().cast(), self.map_len);
            libc::close(self.fd);
        }
    }
}
