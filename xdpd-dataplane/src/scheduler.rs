// SPDX-License-Identifier: Apache-2.0

//! The processing scheduler (§4.4): a fixed-size core table, port
//! attach/detach, and the `running_hash` barrier that is the only
//! synchronization between a scheduling mutation and the data path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use xdpd_concurrency::sync::Mutex;

use crate::worker::CoreHandle;

/// Per-core bound on attached ports, matching the teacher's
/// `PROCESSING_MAX_PORTS_PER_CORE` guard against unbounded fan-out tables.
pub const MAX_PORTS_PER_CORE: usize = 32;

pub type CoreId = usize;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no core has capacity for another port (all cores at {0} ports)")]
    NoCapacity(usize),
    #[error("cross-NUMA-socket assignment required but strict mode forbids it")]
    CrossSocketForbidden,
    #[error("port {0} is not attached to any core")]
    NotAttached(u32),
    #[error("core {0} does not exist")]
    UnknownCore(CoreId),
}

/// One core's scheduling state (§4.4: `available`, `active`, a port list,
/// `num_of_rx_ports`, `running_hash`).
#[derive(Debug, Default)]
struct CoreSlot {
    available: bool,
    active: bool,
    numa_node: Option<u32>,
    ports: Vec<u32>,
    published_hash: AtomicU64,
}

impl CoreSlot {
    fn num_of_rx_ports(&self) -> usize {
        self.ports.len()
    }
}

/// `cores[CORE_MAX]` plus the global `running_hash` (§4.4, §5 "Scheduler
/// table: guarded by a single spinlock held only during attach/detach").
pub struct Scheduler {
    cores: Mutex<Vec<CoreSlot>>,
    running_hash: AtomicU64,
    strict_numa: bool,
    handles: Mutex<HashMap<CoreId, CoreHandle>>,
}

impl Scheduler {
    /// Build a scheduler over `core_count` cores, each optionally tagged
    /// with a NUMA node for the attach-time affinity tie-break. `strict_numa`
    /// makes a cross-socket attach fail instead of warn-and-proceed.
    #[must_use]
    pub fn new(numa_nodes: Vec<Option<u32>>, strict_numa: bool) -> Self {
        let cores = numa_nodes
            .into_iter()
            .map(|numa_node| CoreSlot {
                available: true,
                active: false,
                numa_node,
                ports: Vec::new(),
                published_hash: AtomicU64::new(0),
            })
            .collect();
        Scheduler {
            cores: Mutex::new(cores),
            running_hash: AtomicU64::new(0),
            strict_numa,
            handles: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn running_hash(&self) -> u64 {
        self.running_hash.load(Ordering::SeqCst)
    }

    fn bump_hash(&self) -> u64 {
        self.running_hash.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A core publishes its observed hash once per poll-loop iteration.
    pub fn publish(&self, core: CoreId, hash: u64) {
        if let Some(slot) = self.cores.lock().unwrap().get(core) {
            slot.published_hash.store(hash, Ordering::SeqCst);
        }
    }

    /// Attach (`schedule_port`): pick the available core with the lowest
    /// `num_of_rx_ports`, breaking ties by NUMA-socket affinity to
    /// `port_numa_node`. A cross-socket pick is allowed with a warning
    /// unless `strict_numa` is set, in which case it fails.
    pub fn schedule_port(&self, port_num: u32, port_numa_node: Option<u32>) -> Result<CoreId, SchedulerError> {
        let mut cores = self.cores.lock().unwrap();
        let candidate = cores
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.available && slot.num_of_rx_ports() < MAX_PORTS_PER_CORE)
            .min_by_key(|(idx, slot)| {
                let same_socket = port_numa_node.is_some() && slot.numa_node == port_numa_node;
                (slot.num_of_rx_ports(), !same_socket, *idx)
            })
            .map(|(idx, _)| idx);

        let Some(core_id) = candidate else {
            return Err(SchedulerError::NoCapacity(MAX_PORTS_PER_CORE));
        };

        let same_socket = port_numa_node.is_some() && cores[core_id].numa_node == port_numa_node;
        if port_numa_node.is_some() && !same_socket {
            if self.strict_numa {
                return Err(SchedulerError::CrossSocketForbidden);
            }
            tracing::warn!(port_num, core_id, "scheduling port on a cross-NUMA-socket core");
        }

        cores[core_id].ports.push(port_num);
        drop(cores);
        self.bump_hash();
        Ok(core_id)
    }

    /// Detach (`deschedule_port`): compact the owning core's port list and
    /// bump `running_hash`. Returns once every *active* core (one with a
    /// registered [`CoreHandle`]) has observed the new hash — the hash
    /// barrier (§4.4) — so the caller may then free resources the detached
    /// port held.
    pub fn deschedule_port(&self, port_num: u32) -> Result<(), SchedulerError> {
        let mut cores = self.cores.lock().unwrap();
        let mut found = false;
        for slot in cores.iter_mut() {
            if let Some(pos) = slot.ports.iter().position(|p| *p == port_num) {
                slot.ports.remove(pos);
                found = true;
                break;
            }
        }
        drop(cores);
        if !found {
            return Err(SchedulerError::NotAttached(port_num));
        }
        let target = self.bump_hash();
        self.wait_for_hash_barrier(target);
        Ok(())
    }

    /// Only *active* cores (those with a running poll loop) are waited on;
    /// a core with no [`CoreHandle`] registered never publishes a hash and
    /// would otherwise stall every detach.
    fn wait_for_hash_barrier(&self, target: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let all_caught_up = {
                let cores = self.cores.lock().unwrap();
                cores
                    .iter()
                    .filter(|slot| slot.active)
                    .all(|slot| slot.published_hash.load(Ordering::SeqCst) >= target)
            };
            if all_caught_up || Instant::now() > deadline {
                return;
            }
            std::thread::yield_now();
        }
    }

    pub fn register_handle(&self, core: CoreId, handle: CoreHandle) {
        if let Some(slot) = self.cores.lock().unwrap().get_mut(core) {
            slot.active = true;
        }
        self.handles.lock().unwrap().insert(core, handle);
    }

    /// Signal every registered core to exit its poll loop and join it, in
    /// reverse order of registration (§9 "torn down in reverse order").
    pub fn shutdown(&self) {
        let mut handles: Vec<_> = self.handles.lock().unwrap().drain().collect();
        handles.sort_by_key(|(id, _)| std::cmp::Reverse(*id));
        {
            let mut cores = self.cores.lock().unwrap();
            for (id, _) in &handles {
                if let Some(slot) = cores.get_mut(*id) {
                    slot.active = false;
                }
            }
        }
        for (_, handle) in handles {
            handle.stop_and_join();
        }
    }

    #[must_use]
    pub fn ports_on(&self, core: CoreId) -> Vec<u32> {
        self.cores.lock().unwrap().get(core).map(|s| s.ports.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn core_count(&self) -> usize {
        self.cores.lock().unwrap().len()
    }
}
