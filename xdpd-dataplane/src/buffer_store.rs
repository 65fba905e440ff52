// SPDX-License-Identifier: Apache-2.0

//! Stored-packet table backing the `PACKET_IN` / `PACKET_OUT` round trip
//! (§4.6 "packet-out path", §4.7 "staged packet reprocessing"). A table
//! miss routed to the controller stores its descriptor here under a
//! `buffer_id`; a later `PACKET_OUT` or flow-mod `buffer_id` reference
//! retrieves (and removes) it, re-entering the pipeline with the same
//! descriptor rather than a fresh allocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use xdpd_net::buffer::PacketBufferMut;
use xdpd_net::packet::Packet;

/// How long a stored packet survives before `reap_expired` reclaims it.
/// No controller round trip should ever take this long; it exists purely
/// to bound memory when a controller goes away mid-conversation.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct Stored<Buf: PacketBufferMut> {
    packet: Packet<Buf>,
    in_port: u32,
    stored_at: Instant,
}

/// A bounded table of packets awaiting a controller's `PACKET_OUT` or
/// staged flow-mod reply. One instance per `Runtime`; shared across every
/// core's poll loop behind a single mutex, since the expected traffic is
/// table misses only, not the RX fast path.
pub struct BufferStore<Buf: PacketBufferMut> {
    entries: Mutex<HashMap<u32, Stored<Buf>>>,
    next_id: AtomicU32,
    ttl: Duration,
}

impl<Buf: PacketBufferMut> BufferStore<Buf> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        BufferStore {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            ttl,
        }
    }

    /// Store `packet` and hand back the `buffer_id` a `PACKET_IN` upcall
    /// would carry. `0` is never issued so callers can use it as a
    /// "no buffer" sentinel.
    pub fn store(&self, packet: Packet<Buf>, in_port: u32) -> u32 {
        self.reap_expired();
        let id = loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed);
            if candidate != 0 {
                break candidate;
            }
        };
        self.entries.lock().unwrap().insert(
            id,
            Stored {
                packet,
                in_port,
                stored_at: Instant::now(),
            },
        );
        id
    }

    /// Retrieve and remove a stored packet, along with the port it
    /// originally arrived on. Returns `None` if the id was never issued,
    /// already consumed, or has aged past the store's TTL.
    pub fn take(&self, buffer_id: u32) -> Option<(Packet<Buf>, u32)> {
        let mut entries = self.entries.lock().unwrap();
        let stored = entries.remove(&buffer_id)?;
        if stored.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some((stored.packet, stored.in_port))
    }

    /// Drop every entry older than the configured TTL, returning the ids
    /// reclaimed. Called opportunistically on `store`; may also be driven
    /// periodically by a housekeeping pass.
    pub fn reap_expired(&self) -> Vec<u32> {
        let mut entries = self.entries.lock().unwrap();
        let ttl = self.ttl;
        let expired: Vec<u32> = entries
            .iter()
            .filter(|(_, stored)| stored.stored_at.elapsed() > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            entries.remove(id);
        }
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;
    use xdpd_net::buffer::TestBuffer;

    fn packet() -> Packet<TestBuffer> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        Packet::new(TestBuffer::new(&out, 32, 32), None, true).unwrap()
    }

    #[test]
    fn store_then_take_round_trips_and_removes() {
        let store: BufferStore<TestBuffer> = BufferStore::new(DEFAULT_TTL);
        let id = store.store(packet(), 3);
        assert_ne!(id, 0);
        assert_eq!(store.len(), 1);

        let (_, in_port) = store.take(id).unwrap();
        assert_eq!(in_port, 3);
        assert!(store.take(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_buffer_id_returns_none() {
        let store: BufferStore<TestBuffer> = BufferStore::new(DEFAULT_TTL);
        assert!(store.take(42).is_none());
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let store: BufferStore<TestBuffer> = BufferStore::new(Duration::from_millis(1));
        let id = store.store(packet(), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.take(id).is_none());
    }

    #[test]
    fn reap_expired_reclaims_stale_entries_without_a_take() {
        let store: BufferStore<TestBuffer> = BufferStore::new(Duration::from_millis(1));
        store.store(packet(), 0);
        std::thread::sleep(Duration::from_millis(5));
        let reclaimed = store.reap_expired();
        assert_eq!(reclaimed.len(), 1);
        assert!(store.is_empty());
    }
}
