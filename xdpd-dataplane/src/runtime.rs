// SPDX-License-Identifier: Apache-2.0

//! The process-wide runtime (§9 "Runtime"): the scheduler, port registry,
//! pipeline tables, and group table all live exactly once per process, built
//! together here and torn down in reverse order on [`Runtime::shutdown`].

use std::sync::Arc;

use xdpd_admin::{Pirl, PirlConfig};
use xdpd_flow_entry::GroupTable;
use xdpd_net::buffer::{BufferPool, PacketBufferMut};
use xdpd_pipeline::{PipelineTables, PipelineTablesError};

use crate::buffer_store::{BufferStore, DEFAULT_TTL};
use crate::ports::PortRegistry;
use crate::scheduler::{CoreId, Scheduler};
use crate::worker::{self, MeterGate};

/// Construction parameters for a [`Runtime`]. One core slot per entry in
/// `numa_nodes`; `strict_numa` forbids cross-socket port attachment.
pub struct RuntimeConfig {
    pub numa_nodes: Vec<Option<u32>>,
    pub strict_numa: bool,
    pub num_tables: u8,
    pub pirl: PirlConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Tables(#[from] PipelineTablesError),
}

/// Everything a running datapath needs, minus the per-port drivers
/// themselves (callers attach those through [`Runtime::registry`] and
/// [`Scheduler::schedule_port`] after construction).
pub struct Runtime<Buf: PacketBufferMut, P> {
    pub scheduler: Arc<Scheduler>,
    pub registry: PortRegistry<Buf, P>,
    pub tables: Arc<PipelineTables>,
    pub groups: Arc<GroupTable>,
    pub buffer_store: Arc<BufferStore<Buf>>,
    pub pirl: Arc<Pirl>,
    pool: P,
    meter: MeterGate,
    cores_started: bool,
}

impl<Buf, P> Runtime<Buf, P>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf> + Clone + Send + Sync + 'static,
{
    pub fn new(config: RuntimeConfig, pool: P, meter: MeterGate) -> Result<Self, RuntimeError> {
        let tables = PipelineTables::new(config.num_tables)?;
        Ok(Runtime {
            scheduler: Arc::new(Scheduler::new(config.numa_nodes, config.strict_numa)),
            registry: PortRegistry::default(),
            tables: Arc::new(tables),
            groups: Arc::new(GroupTable::new()),
            buffer_store: Arc::new(BufferStore::new(DEFAULT_TTL)),
            pirl: Arc::new(Pirl::new(config.pirl)),
            pool,
            meter,
            cores_started: false,
        })
    }

    /// Spawn one poll-loop thread per core and register it with the
    /// scheduler. Idempotent only in the sense that calling it twice spawns
    /// a second set of threads racing the first over the same ports — the
    /// caller must call it exactly once.
    pub fn start_cores(&mut self) {
        for core_id in 0..self.scheduler.core_count() {
            self.start_core(core_id);
        }
        self.cores_started = true;
    }

    fn start_core(&self, core_id: CoreId) {
        let handle = worker::spawn_core(
            core_id,
            Arc::clone(&self.scheduler),
            self.registry.clone(),
            Arc::clone(&self.tables),
            Arc::clone(&self.groups),
            self.pool.clone(),
            Arc::clone(&self.meter),
            Arc::clone(&self.buffer_store),
            Arc::clone(&self.pirl),
        );
        self.scheduler.register_handle(core_id, handle);
    }

    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Stop every core's poll loop and join its thread, in reverse order of
    /// registration (§9). Safe to call even if `start_cores` was never
    /// called: the scheduler simply has no handles to drain.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.cores_started = false;
    }
}

impl<Buf: PacketBufferMut, P> Drop for Runtime<Buf, P> {
    fn drop(&mut self) {
        if self.cores_started {
            self.scheduler.shutdown();
        }
    }
}
