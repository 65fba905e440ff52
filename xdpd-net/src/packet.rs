// SPDX-License-Identifier: Apache-2.0

//! The packet descriptor: the handle that owns one frame from RX through
//! the pipeline to TX (§3 "Packet descriptor").

use crate::buffer::{PacketBufferMut, Prepend};
use crate::headers::{Headers, ParseError};
use crate::vlan::Vlan;

/// Why a packet stopped moving through the scheduler, mirroring the
/// teacher's `DoneReason` bookkeeping so the worker loop can account for
/// every packet it took off a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// Delivered to an output port's TX queue.
    Transmitted,
    /// Dropped by an explicit `OFPAT_DROP` / no matching flow entry with a
    /// `CONTINUE`-less table-miss.
    Dropped,
    /// Sent to the controller as a `packet-in`.
    PacketIn,
    /// Consumed by a group bucket that forwards to the controller or to
    /// nowhere (all buckets down).
    Consumed,
}

/// An accumulated write-actions set, applied once at the end of pipeline
/// execution (§4.5: `WRITE_ACTIONS` accumulates, `APPLY_ACTIONS` executes
/// immediately).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteActions {
    actions: Vec<RawAction>,
}

/// Placeholder action representation at the net-crate layer; the pipeline
/// crate defines the full typed action enum and converts through this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAction(pub Vec<u8>);

impl WriteActions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn write(&mut self, action: RawAction) {
        self.actions.retain(|existing| !same_action_kind(existing, &action));
        self.actions.push(action);
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    #[must_use]
    pub fn drain(&mut self) -> Vec<RawAction> {
        std::mem::take(&mut self.actions)
    }
}

fn same_action_kind(a: &RawAction, b: &RawAction) -> bool {
    a.0.first() == b.0.first()
}

/// The packet descriptor. Generic over the buffer implementation so the
/// same pipeline code runs over a pool-owned [`crate::buffer::TestBuffer`]
/// in tests and a zero-copy ring slot in production.
#[derive(Debug)]
pub struct Packet<Buf: PacketBufferMut> {
    buffer: Buf,
    headers: Headers,
    /// Queue selector chosen by an `OFPAT_SET_QUEUE` action, if any.
    output_queue: Option<u32>,
    /// True if this descriptor's buffer came from the shared pool rather
    /// than a per-port ring slot (controls who is responsible for freeing
    /// it on drop).
    owned_by_pool: bool,
    /// True for a copy produced by an `ALL`/`SELECT`-group or flood replication,
    /// as opposed to the original RX descriptor.
    is_replica: bool,
    write_actions: WriteActions,
    /// Wall-clock receive timestamp, when the port driver records one.
    rx_timestamp_ns: Option<u64>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NewPacketError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no headroom to splice a ring-reported VLAN tag into the buffer")]
    VlanSpliceOverflow,
}

/// Materialize a VLAN tag the RX ring reported out-of-band into a
/// standards-conformant in-buffer 802.1Q header, growing into headroom the
/// same way an explicit `PUSH_VLAN` action would. Ring-reported tags carry
/// no in-buffer presence of their own, so anything downstream that edits or
/// forwards raw bytes (rather than the typed `Headers`) needs the tag to
/// actually be there.
fn splice_ring_vlan<Buf: PacketBufferMut>(buffer: &mut Buf, tag: Vlan) -> Result<(), NewPacketError> {
    buffer.prepend(&[0u8; 4]).map_err(|_| NewPacketError::VlanSpliceOverflow)?;
    let body = buffer.as_mut();
    body.copy_within(4..16, 0);
    body[12..16].copy_from_slice(&tag.to_bytes());
    Ok(())
}

impl<Buf: PacketBufferMut> Packet<Buf> {
    /// Classify `buffer`'s current bytes and wrap it in a descriptor.
    /// `ring_vlan` carries any VLAN tag the RX ring reported out-of-band; it
    /// is spliced into the buffer as a real 802.1Q header before
    /// classification settles, so the rest of the pipeline sees exactly the
    /// same byte layout it would for a tag the NIC left in-buffer.
    pub fn new(mut buffer: Buf, ring_vlan: Option<Vlan>, owned_by_pool: bool) -> Result<Self, NewPacketError> {
        let headers = match ring_vlan {
            Some(tag) => {
                splice_ring_vlan(&mut buffer, tag)?;
                Headers::parse(buffer.as_ref(), None)?
            }
            None => Headers::parse(buffer.as_ref(), None)?,
        };
        Ok(Packet {
            buffer,
            headers,
            output_queue: None,
            owned_by_pool,
            is_replica: false,
            write_actions: WriteActions::default(),
            rx_timestamp_ns: None,
        })
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[must_use]
    pub fn buffer(&self) -> &Buf {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buf {
        &mut self.buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.as_ref().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn output_queue(&self) -> Option<u32> {
        self.output_queue
    }

    pub fn set_output_queue(&mut self, queue: u32) {
        self.output_queue = Some(queue);
    }

    #[must_use]
    pub fn is_replica(&self) -> bool {
        self.is_replica
    }

    /// Produce a replica for multi-bucket group/flood delivery. The
    /// replica shares no mutable buffer state with the original; callers
    /// must supply an independently-allocated buffer with the same bytes.
    #[must_use]
    pub fn make_replica(&self, buffer: Buf) -> Self {
        Packet {
            buffer,
            headers: self.headers,
            output_queue: self.output_queue,
            owned_by_pool: self.owned_by_pool,
            is_replica: true,
            write_actions: self.write_actions.clone(),
            rx_timestamp_ns: self.rx_timestamp_ns,
        }
    }

    #[must_use]
    pub fn owned_by_pool(&self) -> bool {
        self.owned_by_pool
    }

    pub fn write_actions_mut(&mut self) -> &mut WriteActions {
        &mut self.write_actions
    }

    #[must_use]
    pub fn rx_timestamp_ns(&self) -> Option<u64> {
        self.rx_timestamp_ns
    }

    pub fn set_rx_timestamp_ns(&mut self, ts: u64) {
        self.rx_timestamp_ns = Some(ts);
    }

    /// Re-classify after an in-place header rewrite (e.g. a VLAN push/pop
    /// action changed the byte layout). Pipeline stages that mutate the
    /// buffer must call this before further match lookups.
    pub fn reclassify(&mut self) -> Result<(), ParseError> {
        self.headers = Headers::parse(self.buffer.as_ref(), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::TestBuffer;
    use etherparse::PacketBuilder;

    fn udp_v4_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn new_packet_classifies_from_buffer() {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 64, 64);
        let packet = Packet::new(buf, None, true).unwrap();
        assert!(packet.headers().udp.is_some());
        assert_eq!(packet.len(), frame.len());
    }

    #[test]
    fn ring_reported_vlan_is_spliced_into_the_buffer() {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 32, 32);
        let ring_vlan = Vlan {
            tpid: crate::vlan::Tpid::CTag,
            pcp: 1,
            dei: false,
            vid: 42,
        };
        let packet = Packet::new(buf, Some(ring_vlan), true).unwrap();

        assert_eq!(packet.headers().vlan, Some(ring_vlan));
        assert!(packet.headers().state.vlan_offset.is_some());
        assert_eq!(packet.len(), frame.len() + 4);
        assert_eq!(packet.headers().eth.source(), crate::eth::Mac([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn ring_reported_vlan_without_headroom_is_reported() {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 0, 0);
        let ring_vlan = Vlan {
            tpid: crate::vlan::Tpid::CTag,
            pcp: 0,
            dei: false,
            vid: 1,
        };
        let err = Packet::new(buf, Some(ring_vlan), true).unwrap_err();
        assert_eq!(err, NewPacketError::VlanSpliceOverflow);
    }

    #[test]
    fn write_actions_last_writer_wins_per_kind() {
        let mut actions = WriteActions::default();
        actions.write(RawAction(vec![1, 0xAA]));
        actions.write(RawAction(vec![1, 0xBB]));
        actions.write(RawAction(vec![2, 0xCC]));
        let drained = actions.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&RawAction(vec![1, 0xBB])));
        assert!(drained.contains(&RawAction(vec![2, 0xCC])));
    }

    #[test]
    fn replica_is_flagged_and_shares_headers() {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 64, 64);
        let packet = Packet::new(buf, None, true).unwrap();
        let replica_buf = TestBuffer::new(&frame, 64, 64);
        let replica = packet.make_replica(replica_buf);
        assert!(replica.is_replica());
        assert!(!packet.is_replica());
        assert_eq!(replica.headers().state.stack, packet.headers().state.stack);
    }

    #[test]
    fn reclassify_picks_up_in_place_rewrite() {
        let frame = udp_v4_frame();
        let buf = TestBuffer::new(&frame, 64, 64);
        let mut packet = Packet::new(buf, None, true).unwrap();
        packet.headers_mut().eth.set_destination(crate::eth::Mac::BROADCAST);
        let mut out = vec![0u8; crate::eth::Eth::HEADER_LEN];
        packet.headers().eth.write(&mut out).unwrap();
        packet.buffer_mut().as_mut()[..out.len()].copy_from_slice(&out);
        packet.reclassify().unwrap();
        assert_eq!(packet.headers().eth.destination(), crate::eth::Mac::BROADCAST);
    }
}
