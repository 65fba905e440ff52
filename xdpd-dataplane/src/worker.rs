// SPDX-License-Identifier: Apache-2.0

//! The per-core poll loop (§4.4 "Core poll loop"): publish the scheduler
//! hash, drain TX queues on an interval, and drive RX on every port the
//! scheduler has attached to this core, feeding each received frame through
//! the pipeline dispatcher and the action executor in turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use xdpd_admin::Pirl;
use xdpd_concurrency::thread::{self, JoinHandle};
use xdpd_flow_entry::{Action, GroupTable};
use xdpd_interface_manager::port::{meta_port, NicPort, TX_DRAIN_INTERVAL};
use xdpd_net::buffer::{BufferPool, PacketBufferMut};
use xdpd_net::packet::Packet;
use xdpd_pipeline::{dispatch, DispatchOutcome, PipelineTables};

use crate::buffer_store::BufferStore;
use crate::executor::{self, ExecuteOutcome};
use crate::ports::PortRegistry;
use crate::scheduler::{CoreId, Scheduler};

/// How many frames a single RX pass pulls off one port before moving on to
/// the next (§4.4 "bounded per-port burst" fairness guard).
const RX_BURST_BUDGET: usize = 64;
const TX_BURST_BUDGET: usize = 64;

/// A meter gate: decides whether a `METER` instruction's band admits a
/// packet. Distinct from [`Pirl`], which gates the packet-in upcall path
/// rather than in-pipeline traffic classes.
pub type MeterGate = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// A running core's thread handle, owned by the [`Scheduler`] (§9 "torn
/// down in reverse order"). Consumed by [`CoreHandle::stop_and_join`] so a
/// core can only ever be stopped once.
pub struct CoreHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CoreHandle {
    pub fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the poll loop for `core_id` as its own OS thread. The returned
/// handle is what [`Scheduler::register_handle`] and later
/// [`Scheduler::shutdown`] use to stop it.
#[allow(clippy::too_many_arguments)]
pub fn spawn_core<Buf, P>(
    core_id: CoreId,
    scheduler: Arc<Scheduler>,
    registry: PortRegistry<Buf, P>,
    tables: Arc<PipelineTables>,
    groups: Arc<GroupTable>,
    pool: P,
    meter: MeterGate,
    buffer_store: Arc<BufferStore<Buf>>,
    pirl: Arc<Pirl>,
) -> CoreHandle
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf> + Clone + Send + Sync + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = Arc::clone(&stop);
    let join = thread::spawn(move || {
        run_core(
            core_id,
            &scheduler,
            &registry,
            &tables,
            &groups,
            &pool,
            &meter,
            &buffer_store,
            &pirl,
            &stop_for_thread,
        );
    });
    CoreHandle {
        stop,
        join: Some(join),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_core<Buf, P>(
    core_id: CoreId,
    scheduler: &Scheduler,
    registry: &PortRegistry<Buf, P>,
    tables: &PipelineTables,
    groups: &GroupTable,
    pool: &P,
    meter: &MeterGate,
    buffer_store: &BufferStore<Buf>,
    pirl: &Pirl,
    stop: &AtomicBool,
) where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    let mut last_tx_drain = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        scheduler.publish(core_id, scheduler.running_hash());

        if last_tx_drain.elapsed() >= TX_DRAIN_INTERVAL {
            drain_tx(core_id, scheduler, registry);
            last_tx_drain = Instant::now();
        }

        for port_num in scheduler.ports_on(core_id) {
            drive_rx(port_num, tables, groups, registry, pool, meter, buffer_store, pirl);
        }

        thread::yield_now();
    }
}

fn drain_tx<Buf, P>(core_id: CoreId, scheduler: &Scheduler, registry: &PortRegistry<Buf, P>)
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    for port_num in scheduler.ports_on(core_id) {
        registry.with_entry(port_num, |entry| {
            let driver = &mut entry.driver;
            for queue in &mut entry.switch_port.queues {
                if let Err(err) = driver.write(queue, TX_BURST_BUDGET) {
                    tracing::warn!(port_num, ?err, "TX drain failed");
                }
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn drive_rx<Buf, P>(
    port_num: u32,
    tables: &PipelineTables,
    groups: &GroupTable,
    registry: &PortRegistry<Buf, P>,
    pool: &P,
    meter: &MeterGate,
    buffer_store: &BufferStore<Buf>,
    pirl: &Pirl,
) where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    for _ in 0..RX_BURST_BUDGET {
        let received = registry.with_entry(port_num, |entry| match entry.driver.read() {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(port_num, ?err, "RX failed");
                None
            }
        });

        let Some(packet) = received.flatten() else {
            return;
        };

        match dispatch(&packet, port_num, tables, |id| meter(id)) {
            Ok(DispatchOutcome::Dropped) => {}
            Ok(DispatchOutcome::PacketIn) => {
                if !pirl.filter() {
                    tracing::trace!(port_num, "table miss dropped by PIRL");
                    continue;
                }
                let buffer_id = buffer_store.store(packet, port_num);
                tracing::debug!(port_num, buffer_id, "table miss stored, routed to controller");
            }
            Ok(DispatchOutcome::Execute(actions)) if actions.iter().any(is_controller_output) && !pirl.filter() => {
                tracing::trace!(port_num, "CONTROLLER action dropped by PIRL");
            }
            Ok(DispatchOutcome::Execute(actions)) => {
                let select_hash = select_hash_of(&packet);
                match executor::execute(packet, port_num, &actions, registry, groups, pool, select_hash, buffer_store) {
                    ExecuteOutcome::Transmitted | ExecuteOutcome::Dropped => {}
                    ExecuteOutcome::ToController { buffer_id } => {
                        tracing::debug!(port_num, buffer_id, "CONTROLLER action stored, routed to controller");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(port_num, ?err, "pipeline dispatch failed");
            }
        }
    }
}

/// Whether an action list's `OUTPUT` targets the `CONTROLLER` meta-port —
/// the only case PIRL (§4.9) has any business gating.
fn is_controller_output(action: &Action) -> bool {
    matches!(action, Action::Output { port: meta_port::CONTROLLER, .. })
}

/// A stable-enough hash of the 5-tuple for `SELECT`-group load balancing
/// (§4.6 `buckets_to_execute`'s `select_hash`). Packets with no transport
/// header (ARP, fragments past the first) hash only what's present.
pub(crate) fn select_hash_of<Buf: PacketBufferMut>(packet: &Packet<Buf>) -> u32 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use xdpd_net::ip::Ip;

    let mut hasher = DefaultHasher::new();
    let headers = packet.headers();
    headers.eth.source().0.hash(&mut hasher);
    headers.eth.destination().0.hash(&mut hasher);
    if let Some(ip) = &headers.ip {
        match ip {
            Ip::V4(v4) => {
                v4.source().hash(&mut hasher);
                v4.destination().hash(&mut hasher);
            }
            Ip::V6(v6) => {
                v6.source().hash(&mut hasher);
                v6.destination().hash(&mut hasher);
            }
        }
        ip.protocol().hash(&mut hasher);
    }
    if let Some(tcp) = &headers.tcp {
        tcp.source_port().hash(&mut hasher);
        tcp.destination_port().hash(&mut hasher);
    }
    if let Some(udp) = &headers.udp {
        udp.source_port().hash(&mut hasher);
        udp.destination_port().hash(&mut hasher);
    }
    hasher.finish() as u32
}

#[cfg(test)]
mod test {
    use super::*;
    use xdpd_net::buffer::TestBuffer;

    fn udp_v4_frame() -> Vec<u8> {
        use etherparse::PacketBuilder;
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn select_hash_is_stable_for_the_same_packet() {
        let bytes = udp_v4_frame();
        let a = Packet::new(TestBuffer::new(&bytes, 0, 0), None, true).unwrap();
        let b = Packet::new(TestBuffer::new(&bytes, 0, 0), None, true).unwrap();
        assert_eq!(select_hash_of(&a), select_hash_of(&b));
    }

    #[test]
    fn is_controller_output_matches_only_the_controller_meta_port() {
        let to_controller = Action::Output {
            port: meta_port::CONTROLLER,
            max_len: None,
        };
        let to_port = Action::Output { port: 3, max_len: None };
        assert!(is_controller_output(&to_controller));
        assert!(!is_controller_output(&to_port));
    }

    #[test]
    fn core_handle_stop_and_join_returns_promptly() {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let join = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::SeqCst) {
                thread::yield_now();
            }
        });
        let handle = CoreHandle {
            stop,
            join: Some(join),
        };
        handle.stop_and_join();
    }
}
