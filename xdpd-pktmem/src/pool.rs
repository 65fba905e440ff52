// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use thiserror::Error;
use tracing::{debug, info};

use xdpd_net::buffer::{
    Append, BufferAllocationError, BufferPool, BufferPoolConfig as TraitConfig, GrowError,
    Headroom, NewBufferPool, Pool as PoolTrait, Prepend, Tailroom, TrimFromEnd, TrimFromStart,
};

/// Unvalidated parameters for a pool; use [`PoolConfig::new`] to validate
/// them into a [`PoolConfig`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolParams {
    /// Number of slabs the pool owns.
    pub capacity: u32,
    /// Bytes reserved per slab before the frame start, for header pushes.
    pub headroom: u16,
    /// Total bytes per slab, including headroom.
    pub slot_size: u16,
}

impl Default for PoolParams {
    fn default() -> Self {
        PoolParams {
            capacity: (1 << 14) - 1,
            headroom: 128,
            slot_size: 2048,
        }
    }
}

/// Ways a [`PoolParams`]/name pair can fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPoolConfig {
    #[error("pool name must not be empty")]
    EmptyName,
    #[error("pool name {0:?} must be valid ASCII starting with a letter")]
    InvalidName(String),
    #[error("capacity must be nonzero")]
    ZeroCapacity,
    #[error("headroom {headroom} must be smaller than slot size {slot_size}")]
    HeadroomExceedsSlot { headroom: u16, slot_size: u16 },
}

/// A validated pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    name: String,
    params: PoolParams,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, params: PoolParams) -> Result<Self, InvalidPoolConfig> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidPoolConfig::EmptyName);
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) || !name.is_ascii() {
            return Err(InvalidPoolConfig::InvalidName(name));
        }
        if params.capacity == 0 {
            return Err(InvalidPoolConfig::ZeroCapacity);
        }
        if params.headroom >= params.slot_size {
            return Err(InvalidPoolConfig::HeadroomExceedsSlot {
                headroom: params.headroom,
                slot_size: params.slot_size,
            });
        }
        Ok(PoolConfig { name, params })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> PoolParams {
        self.params
    }
}

struct PoolInner {
    config: PoolConfig,
    free: ArrayQueue<Vec<u8>>,
}

/// A fixed-capacity slab pool. Clone is cheap (it's a handle around an
/// `Arc`); every clone shares the same free-list.
#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.0.config.name)
            .field("free", &self.0.free.len())
            .field("capacity", &self.0.config.params.capacity)
            .finish()
    }
}

impl NewBufferPool for Pool {
    fn new_pool(config: TraitConfig) -> Result<Self, xdpd_net::buffer::NewBufferPoolError> {
        // Bridge the generic trait config (crate-agnostic) to our named,
        // validated PoolConfig. An anonymous pool name is used since the
        // trait boundary carries no name.
        let params = PoolParams {
            capacity: config.capacity as u32,
            headroom: config.headroom as u16,
            slot_size: config.slot_size as u16,
        };
        let cfg = PoolConfig::new("pool", params).map_err(|_| {
            xdpd_net::buffer::NewBufferPoolError::HeadroomExceedsSlot {
                headroom: config.headroom,
                slot_size: config.slot_size,
            }
        })?;
        Ok(Pool::new_pkt_pool(cfg))
    }
}

impl Pool {
    /// Create a new slab pool, pre-allocating every slab up front so the
    /// RX/TX hot path never touches the system allocator.
    #[must_use]
    pub fn new_pkt_pool(config: PoolConfig) -> Self {
        info!(name = config.name(), capacity = config.params.capacity, "creating packet memory pool");
        let free = ArrayQueue::new(config.params.capacity as usize);
        for _ in 0..config.params.capacity {
            let _ = free.push(vec![0u8; config.params.slot_size as usize]);
        }
        Pool(Arc::new(PoolInner { config, free }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.config.name()
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.0.config
    }

    /// Number of slabs currently available for allocation.
    #[must_use]
    pub fn available(&self) -> usize {
        self.0.free.len()
    }

    pub fn alloc(&self) -> Result<PoolBuffer, BufferAllocationError> {
        let slab = self.0.free.pop().ok_or(BufferAllocationError::Exhausted)?;
        let headroom = self.0.config.params.headroom as usize;
        debug!(pool = self.name(), "allocated slab");
        Ok(PoolBuffer {
            pool: Arc::clone(&self.0),
            data: slab,
            headroom,
            len: 0,
        })
    }

    fn new_buffer_with(&self, data: &[u8]) -> Result<PoolBuffer, BufferAllocationError> {
        let headroom = self.0.config.params.headroom as usize;
        let slot_size = self.0.config.params.slot_size as usize;
        if headroom + data.len() > slot_size {
            return Err(BufferAllocationError::TooLarge {
                requested: data.len(),
                slot_size,
            });
        }
        let mut buf = self.alloc()?;
        buf.data[headroom..headroom + data.len()].copy_from_slice(data);
        buf.len = data.len();
        Ok(buf)
    }
}

impl PoolTrait<PoolBuffer> for Pool {
    fn allocate(&self) -> Result<PoolBuffer, BufferAllocationError> {
        self.alloc()
    }
}

impl BufferPool<PoolBuffer> for Pool {
    fn new_buffer(&self, data: &[u8]) -> Result<PoolBuffer, BufferAllocationError> {
        self.new_buffer_with(data)
    }
}

/// A slab on loan from a [`Pool`]. Returns itself to the pool's free-list
/// on drop, so the pool never grows or shrinks after construction.
pub struct PoolBuffer {
    pool: Arc<PoolInner>,
    data: Vec<u8>,
    headroom: usize,
    len: usize,
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("headroom", &self.headroom)
            .field("len", &self.len)
            .field("tailroom", &self.tailroom())
            .finish()
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        let slab = std::mem::take(&mut self.data);
        // ArrayQueue::push only fails if the queue is full, which cannot
        // happen here: each slab is returned to the same pool it came from.
        let _ = self.pool.free.push(slab);
    }
}

impl PoolBuffer {
    fn body_end(&self) -> usize {
        self.headroom + self.len
    }
}

impl AsRef<[u8]> for PoolBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.headroom..self.body_end()]
    }
}

impl AsMut<[u8]> for PoolBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        let end = self.body_end();
        &mut self.data[self.headroom..end]
    }
}

impl Headroom for PoolBuffer {
    fn headroom(&self) -> usize {
        self.headroom
    }
}

impl Tailroom for PoolBuffer {
    fn tailroom(&self) -> usize {
        self.data.len() - self.body_end()
    }
}

impl Prepend for PoolBuffer {
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
        self.len += bytes.len();
        Ok(())
    }
}

impl Append for PoolBuffer {
    type Error = GrowError;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let tailroom = self.tailroom();
        if bytes.len() > tailroom {
            return Err(GrowError::InsufficientRoom {
                requested: bytes.len(),
                available: tailroom,
            });
        }
        let end = self.body_end();
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

impl TrimFromStart for PoolBuffer {
    fn trim_from_start(&mut self, n: usize) {
        let n = n.min(self.len);
        self.headroom += n;
        self.len -= n;
    }
}

impl TrimFromEnd for PoolBuffer {
    fn trim_from_end(&mut self, n: usize) {
        self.len = self.len.saturating_sub(n);
    }
}
