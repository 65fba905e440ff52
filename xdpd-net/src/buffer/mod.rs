// SPDX-License-Identifier: Apache-2.0

//! Buffer traits that let the packet descriptor run identically over a
//! pool-owned `Vec<u8>` and a zero-copy ring slot.
//!
//! The trait split mirrors the pool's own RX/TX boundary: [`PacketBuffer`]
//! is the read side (anything the classifier and match engine need),
//! [`PacketBufferMut`] adds the write side a port driver or action executor
//! needs (growing headroom/tailroom in place, without a copy).

use std::fmt::Debug;

use thiserror::Error;

/// Read-only view over a packet's bytes plus its headroom budget.
pub trait PacketBuffer: AsRef<[u8]> + Headroom + Debug + 'static {}

impl<T> PacketBuffer for T where T: AsRef<[u8]> + Headroom + Debug + 'static {}

/// Mutable view: everything [`PacketBuffer`] has, plus in-place growth at
/// either end and the ability to move across worker threads.
pub trait PacketBufferMut:
    PacketBuffer + AsMut<[u8]> + Prepend + Append + TrimFromStart + TrimFromEnd + Tailroom + Send
{
}

impl<T> PacketBufferMut for T where
    T: PacketBuffer + AsMut<[u8]> + Prepend + Append + TrimFromStart + TrimFromEnd + Tailroom + Send
{
}

/// Bytes currently free before the packet's data, available to
/// [`Prepend::prepend`] without reallocating.
pub trait Headroom {
    fn headroom(&self) -> usize;
}

/// Bytes currently free after the packet's data, available to
/// [`Append::append`] without reallocating.
pub trait Tailroom {
    fn tailroom(&self) -> usize;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrowError {
    #[error("requested {requested} bytes but only {available} are free")]
    InsufficientRoom { requested: usize, available: usize },
}

/// Write new bytes immediately before the current data (e.g. pushing a
/// VLAN tag or re-encapsulating a frame).
pub trait Prepend {
    type Error;
    fn prepend(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Write new bytes immediately after the current data (e.g. appending an
/// FCS is not needed here, but action list replication of a short payload
/// is).
pub trait Append {
    type Error;
    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Drop `n` bytes from the front of the buffer (e.g. popping a VLAN tag),
/// returning them to headroom.
pub trait TrimFromStart {
    fn trim_from_start(&mut self, n: usize);
}

/// Drop `n` bytes from the back of the buffer, returning them to tailroom.
pub trait TrimFromEnd {
    fn trim_from_end(&mut self, n: usize);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferAllocationError {
    #[error("buffer pool exhausted")]
    Exhausted,
    #[error("requested buffer size {requested} exceeds the pool's slot size {slot_size}")]
    TooLarge { requested: usize, slot_size: usize },
}

/// Anything that can hand out a fresh, empty buffer of its configured slot
/// size — the RX-side allocation path.
pub trait Pool<B: PacketBufferMut> {
    fn allocate(&self) -> Result<B, BufferAllocationError>;
}

/// Configuration used to size a concrete [`BufferPool`] implementation.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferPoolConfig {
    /// Number of buffers the pool owns.
    pub capacity: usize,
    /// Bytes reserved per buffer for header growth before the frame start.
    pub headroom: usize,
    /// Maximum frame size (headroom + payload + tailroom) per buffer.
    pub slot_size: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NewBufferPoolError {
    #[error("capacity must be nonzero")]
    ZeroCapacity,
    #[error("headroom {headroom} must be smaller than slot size {slot_size}")]
    HeadroomExceedsSlot { headroom: usize, slot_size: usize },
}

/// Constructs a concrete pool from a validated [`BufferPoolConfig`].
pub trait NewBufferPool: Sized {
    fn new_pool(config: BufferPoolConfig) -> Result<Self, NewBufferPoolError>;
}

/// A [`Pool`] that also lets callers request a buffer pre-populated with
/// bytes — the common case when reading off a ring or test fixture.
pub trait BufferPool<B: PacketBufferMut>: Pool<B> {
    fn new_buffer(&self, data: &[u8]) -> Result<B, BufferAllocationError>;
}

/// An in-memory buffer for deterministic tests (§8a): fixed headroom,
/// grows by reallocating the backing `Vec`, never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBuffer {
    data: Vec<u8>,
    headroom: usize,
    tailroom: usize,
}

impl TestBuffer {
    #[must_use]
    pub fn new(payload: &[u8], headroom: usize, tailroom: usize) -> Self {
        let mut data = vec![0u8; headroom];
        data.extend_from_slice(payload);
        data.extend(std::iter::repeat(0u8).take(tailroom));
        TestBuffer {
            data,
            headroom,
            tailroom,
        }
    }

    fn body_range(&self) -> std::ops::Range<usize> {
        self.headroom..self.data.len() - self.tailroom
    }
}

impl AsRef<[u8]> for TestBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.body_range()]
    }
}

impl AsMut<[u8]> for TestBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        let range = self.body_range();
        &mut self.data[range]
    }
}

impl Headroom for TestBuffer {
    fn headroom(&self) -> usize {
        self.headroom
    }
}

impl Tailroom for TestBuffer {
    fn tailroom(&self) -> usize {
        self.tailroom
    }
}

impl Prepend for TestBuffer {
    type Error = GrowError;

    fn prepend(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.len() > self.headroom {
            return Err(GrowError::InsufficientRoom {
                requested: bytes.len(),
                available: self.headroom,
            });
        }
        let start = self.headroom - bytes.len();
        self.data[start..self.headroom].copy_from_slice(bytes);
        self.headroom -= bytes.len();
        Ok(())
    }
}

impl Append for TestBuffer {
    type Error = GrowError;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.len() > self.tailroom {
            return Err(GrowError::InsufficientRoom {
                requested: bytes.len(),
                available: self.tailroom,
            });
        }
        let end = self.data.len() - self.tailroom;
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.tailroom -= bytes.len();
        Ok(())
    }
}

impl TrimFromStart for TestBuffer {
    fn trim_from_start(&mut self, n: usize) {
        let n = n.min(self.body_range().len());
        self.headroom += n;
    }
}

impl TrimFromEnd for TestBuffer {
    fn trim_from_end(&mut self, n: usize) {
        let n = n.min(self.body_range().len());
        self.tailroom += n;
    }
}

/// A pool of [`TestBuffer`]s sized by a fixed headroom/slot budget, used by
/// the in-memory test port kind (§8a) and by unit tests in this crate.
#[derive(Debug, Clone)]
pub struct TestBufferPool {
    config: BufferPoolConfig,
}

impl NewBufferPool for TestBufferPool {
    fn new_pool(config: BufferPoolConfig) -> Result<Self, NewBufferPoolError> {
        if config.capacity == 0 {
            return Err(NewBufferPoolError::ZeroCapacity);
        }
        if config.headroom >= config.slot_size {
            return Err(NewBufferPoolError::HeadroomExceedsSlot {
                headroom: config.headroom,
                slot_size: config.slot_size,
            });
        }
        Ok(TestBufferPool { config })
    }
}

impl Pool<TestBuffer> for TestBufferPool {
    fn allocate(&self) -> Result<TestBuffer, BufferAllocationError> {
        Ok(TestBuffer::new(&[], self.config.headroom, self.config.slot_size - self.config.headroom))
    }
}

impl BufferPool<TestBuffer> for TestBufferPool {
    fn new_buffer(&self, data: &[u8]) -> Result<TestBuffer, BufferAllocationError> {
        let needed = self.config.headroom + data.len();
        if needed > self.config.slot_size {
            return Err(BufferAllocationError::TooLarge {
                requested: data.len(),
                slot_size: self.config.slot_size,
            });
        }
        Ok(TestBuffer::new(
            data,
            self.config.headroom,
            self.config.slot_size - needed,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool() -> TestBufferPool {
        TestBufferPool::new_pool(BufferPoolConfig {
            capacity: 4,
            headroom: 32,
            slot_size: 256,
        })
        .unwrap()
    }

    #[test]
    fn new_pool_rejects_zero_capacity() {
        let err = TestBufferPool::new_pool(BufferPoolConfig {
            capacity: 0,
            headroom: 32,
            slot_size: 256,
        })
        .unwrap_err();
        assert_eq!(err, NewBufferPoolError::ZeroCapacity);
    }

    #[test]
    fn new_pool_rejects_headroom_ge_slot_size() {
        let err = TestBufferPool::new_pool(BufferPoolConfig {
            capacity: 1,
            headroom: 256,
            slot_size: 256,
        })
        .unwrap_err();
        assert_eq!(
            err,
            NewBufferPoolError::HeadroomExceedsSlot {
                headroom: 256,
                slot_size: 256
            }
        );
    }

    #[test]
    fn new_buffer_preserves_payload() {
        let pool = pool();
        let buf = pool.new_buffer(b"hello").unwrap();
        assert_eq!(buf.as_ref(), b"hello");
        assert_eq!(buf.headroom(), 32);
    }

    #[test]
    fn new_buffer_rejects_oversized_payload() {
        let pool = pool();
        let err = pool.new_buffer(&vec![0u8; 300]).unwrap_err();
        assert_eq!(
            err,
            BufferAllocationError::TooLarge {
                requested: 300,
                slot_size: 256
            }
        );
    }

    #[test]
    fn prepend_consumes_headroom_and_is_visible_in_body() {
        let pool = pool();
        let mut buf = pool.new_buffer(b"world").unwrap();
        buf.prepend(b"hello ").unwrap();
        assert_eq!(buf.as_ref(), b"hello world");
        assert_eq!(buf.headroom(), 32 - 6);
    }

    #[test]
    fn prepend_beyond_headroom_errors() {
        let pool = pool();
        let mut buf = pool.new_buffer(b"x").unwrap();
        let err = buf.prepend(&vec![0u8; 64]).unwrap_err();
        assert_eq!(
            err,
            GrowError::InsufficientRoom {
                requested: 64,
                available: 32
            }
        );
    }

    #[test]
    fn append_then_trim_round_trips() {
        let pool = pool();
        let mut buf = pool.new_buffer(b"hello").unwrap();
        buf.append(b"!").unwrap();
        assert_eq!(buf.as_ref(), b"hello!");
        buf.trim_from_end(1);
        assert_eq!(buf.as_ref(), b"hello");
    }

    #[test]
    fn trim_from_start_returns_bytes_to_headroom() {
        let pool = pool();
        let mut buf = pool.new_buffer(b"hello world").unwrap();
        buf.trim_from_start(6);
        assert_eq!(buf.as_ref(), b"world");
        assert_eq!(buf.headroom(), 32 + 6);
    }
}
