// SPDX-License-Identifier: Apache-2.0

//! The `PACKET_OUT` entry point (§4.6 "packet-out path"). A controller
//! names either a previously stored buffer or supplies fresh bytes, plus
//! an action list; this module reconstructs (or retrieves) the descriptor
//! and re-enters the action executor exactly as the poll loop would after
//! a full pipeline traversal, without touching flow-table hit counters.

use xdpd_admin::AdminError;
use xdpd_flow_entry::{Action, FlowEntry, GroupId, GroupTable, GroupType};
use xdpd_net::buffer::{BufferPool, PacketBufferMut};
use xdpd_net::packet::Packet;
use xdpd_pipeline::{dispatch, DispatchOutcome, PipelineTables};

use crate::buffer_store::BufferStore;
use crate::executor::{self, ExecuteOutcome};
use crate::ports::PortRegistry;
use crate::worker::select_hash_of;

/// Where a `PACKET_OUT` request's bytes come from.
pub enum PacketOutSource<'a> {
    /// A `buffer_id` from an earlier `PACKET_IN`.
    Stored(u32),
    /// Bytes the controller sent inline, to be classified fresh.
    Fresh(&'a [u8]),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketOutError {
    /// The action list named no `OUTPUT`/`GROUP`; rejected up front so a
    /// stored buffer never leaks. Any `buffer_id` named by the request has
    /// already been released by the time this is returned.
    #[error("action list has no OUTPUT or GROUP action")]
    NoOutputAction,
    #[error("buffer_id {0} has expired or was never stored")]
    BufferExpired(u32),
    #[error("no free buffer to allocate a fresh packet-out descriptor")]
    AllocationFailed,
    #[error("controller-supplied bytes did not parse as a valid frame")]
    Malformed,
}

fn has_terminal_output(actions: &[Action]) -> bool {
    actions.iter().any(|a| matches!(a, Action::Output { .. } | Action::Group(_)))
}

/// Run one `PACKET_OUT` request to completion.
#[allow(clippy::too_many_arguments)]
pub fn process_packet_out<Buf, P>(
    source: PacketOutSource<'_>,
    in_port: u32,
    actions: &[Action],
    store: &BufferStore<Buf>,
    registry: &PortRegistry<Buf, P>,
    groups: &GroupTable,
    pool: &P,
) -> Result<ExecuteOutcome, PacketOutError>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    if !has_terminal_output(actions) {
        if let PacketOutSource::Stored(buffer_id) = source {
            store.take(buffer_id);
        }
        return Err(PacketOutError::NoOutputAction);
    }

    let (packet, effective_in_port) = match source {
        PacketOutSource::Stored(buffer_id) => {
            let (packet, original_in_port) = store.take(buffer_id).ok_or(PacketOutError::BufferExpired(buffer_id))?;
            (packet, original_in_port)
        }
        PacketOutSource::Fresh(bytes) => {
            let buf = pool.new_buffer(bytes).map_err(|_| PacketOutError::AllocationFailed)?;
            let packet = Packet::new(buf, None, true).map_err(|_| PacketOutError::Malformed)?;
            (packet, in_port)
        }
    };

    let select_hash = select_hash_of(&packet);
    Ok(executor::execute(packet, effective_in_port, actions, registry, groups, pool, select_hash, store))
}

/// Errors from the staged-reprocessing helpers below: either the
/// `buffer_id` itself was bad, or the admin-plane call that was supposed
/// to happen first (and did) failed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReprocessError {
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error("buffer_id {0} has expired or was never stored")]
    BufferExpired(u32),
}

/// Re-run a previously stored packet through the pipeline tables exactly
/// as if it had just arrived on `in_port`, using whatever rules are
/// installed *now* (§4.7 "staged packet reprocessing"). Callers install
/// the new FLOW_MOD/GROUP_MOD first, then call this with the request's
/// `buffer_id` so the retry sees the updated tables.
#[allow(clippy::too_many_arguments)]
fn reprocess_buffered_packet<Buf, P>(
    buffer_id: u32,
    store: &BufferStore<Buf>,
    tables: &PipelineTables,
    groups: &GroupTable,
    registry: &PortRegistry<Buf, P>,
    pool: &P,
    meter: &dyn Fn(u32) -> bool,
) -> Result<ExecuteOutcome, ReprocessError>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    let (packet, in_port) = store.take(buffer_id).ok_or(ReprocessError::BufferExpired(buffer_id))?;
    match dispatch(&packet, in_port, tables, meter) {
        Ok(DispatchOutcome::Dropped) => Ok(ExecuteOutcome::Dropped),
        Ok(DispatchOutcome::PacketIn) => {
            let new_buffer_id = store.store(packet, in_port);
            Ok(ExecuteOutcome::ToController { buffer_id: new_buffer_id })
        }
        Ok(DispatchOutcome::Execute(actions)) => {
            let select_hash = select_hash_of(&packet);
            Ok(executor::execute(packet, in_port, &actions, registry, groups, pool, select_hash, store))
        }
        Err(_) => Ok(ExecuteOutcome::Dropped),
    }
}

/// `FLOW_MOD ADD`/`MODIFY`'s optional `buffer_id` (§4.7): install `entry`,
/// then, if the request named a stored packet, immediately re-run it
/// through the table it was just added to. Returns `None` when no
/// `buffer_id` was given.
#[allow(clippy::too_many_arguments)]
pub fn flow_mod_add_and_reprocess<Buf, P>(
    tables: &PipelineTables,
    table_id: u8,
    entry: FlowEntry,
    check_overlap: bool,
    buffer_id: Option<u32>,
    store: &BufferStore<Buf>,
    groups: &GroupTable,
    registry: &PortRegistry<Buf, P>,
    pool: &P,
    meter: &dyn Fn(u32) -> bool,
) -> Result<Option<ExecuteOutcome>, ReprocessError>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    xdpd_admin::flow_mod_add(tables, table_id, entry, check_overlap)?;
    match buffer_id {
        Some(id) => reprocess_buffered_packet(id, store, tables, groups, registry, pool, meter).map(Some),
        None => Ok(None),
    }
}

/// `GROUP_MOD ADD`'s optional `buffer_id` (§4.7): install the group, then,
/// if the request named a stored packet, re-run it through the pipeline
/// with the new group in place.
#[allow(clippy::too_many_arguments)]
pub fn group_mod_add_and_reprocess<Buf, P>(
    groups: &GroupTable,
    id: GroupId,
    group_type: GroupType,
    buckets: Vec<xdpd_flow_entry::Bucket>,
    buffer_id: Option<u32>,
    store: &BufferStore<Buf>,
    tables: &PipelineTables,
    registry: &PortRegistry<Buf, P>,
    pool: &P,
    meter: &dyn Fn(u32) -> bool,
) -> Result<Option<ExecuteOutcome>, ReprocessError>
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    xdpd_admin::group_mod_add(groups, id, group_type, buckets)?;
    match buffer_id {
        Some(buffer_id) => reprocess_buffered_packet(buffer_id, store, tables, groups, registry, pool, meter).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;
    use xdpd_flow_entry::GroupTable;
    use xdpd_interface_manager::port::{AdminState, SwitchPort};
    use xdpd_net::buffer::{BufferPoolConfig, NewBufferPool, TestBuffer, TestBufferPool};
    use xdpd_net::eth::Mac;

    fn pool() -> TestBufferPool {
        TestBufferPool::new_pool(BufferPoolConfig {
            capacity: 8,
            headroom: 32,
            slot_size: 256,
        })
        .unwrap()
    }

    fn frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"payload";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    fn packet() -> Packet<TestBuffer> {
        Packet::new(TestBuffer::new(&frame(), 32, 32), None, true).unwrap()
    }

    fn registry_with_virtual_port(port_num: u32) -> PortRegistry<TestBuffer, TestBufferPool> {
        let registry = PortRegistry::default();
        let mut switch_port = SwitchPort::new(port_num, format!("veth{port_num}"), Mac::ZERO, 1500, 1, 8);
        switch_port.admin_state = AdminState::Up;
        let mut rng = xdpd_interface_manager::virtual_link::ThreadRngBytes::default();
        let (driver, _peer) = xdpd_interface_manager::VirtualLinkPort::new_pair(port_num, port_num + 100, 8, &mut rng);
        registry.insert(crate::ports::PortEntry {
            switch_port,
            driver: crate::ports::PortKind::VirtualLink(driver),
        });
        registry
    }

    #[test]
    fn action_list_with_no_output_is_rejected_and_releases_the_buffer() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let id = store.store(packet(), 1);
        let registry: PortRegistry<TestBuffer, TestBufferPool> = PortRegistry::default();
        let groups = GroupTable::new();

        let err = process_packet_out(PacketOutSource::Stored(id), 1, &[Action::SetQueue(1)], &store, &registry, &groups, &pool()).unwrap_err();

        assert_eq!(err, PacketOutError::NoOutputAction);
        assert!(store.take(id).is_none());
    }

    #[test]
    fn unknown_buffer_id_is_reported() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry: PortRegistry<TestBuffer, TestBufferPool> = PortRegistry::default();
        let groups = GroupTable::new();
        let actions = [Action::Output { port: 1, max_len: None }];

        let err = process_packet_out(PacketOutSource::Stored(99), 0, &actions, &store, &registry, &groups, &pool()).unwrap_err();
        assert_eq!(err, PacketOutError::BufferExpired(99));
    }

    #[test]
    fn stored_buffer_packet_out_delivers_to_output_port() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let id = store.store(packet(), 5);
        let registry = registry_with_virtual_port(1);
        let groups = GroupTable::new();
        let actions = [Action::Output { port: 1, max_len: None }];

        let outcome = process_packet_out(PacketOutSource::Stored(id), 5, &actions, &store, &registry, &groups, &pool()).unwrap();

        assert_eq!(outcome, ExecuteOutcome::Transmitted);
        assert!(registry.with_entry(1, |e| e.driver.read().unwrap().is_some()).unwrap());
    }

    #[test]
    fn fresh_bytes_packet_out_allocates_and_delivers() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry = registry_with_virtual_port(2);
        let groups = GroupTable::new();
        let actions = [Action::Output { port: 2, max_len: None }];
        let bytes = frame();

        let outcome = process_packet_out(PacketOutSource::Fresh(&bytes), 0, &actions, &store, &registry, &groups, &pool()).unwrap();

        assert_eq!(outcome, ExecuteOutcome::Transmitted);
        assert!(registry.with_entry(2, |e| e.driver.read().unwrap().is_some()).unwrap());
    }

    #[test]
    fn flow_mod_add_with_buffer_id_redelivers_through_the_new_rule() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry = registry_with_virtual_port(3);
        let groups = GroupTable::new();
        let tables = PipelineTables::new(1).unwrap();
        let meter: &dyn Fn(u32) -> bool = &|_| true;

        let id = store.store(packet(), 9);
        let entry = FlowEntry::new(1, 10, xdpd_flow_entry::Match::default(), vec![xdpd_flow_entry::Instruction::ApplyActions(vec![Action::Output {
            port: 3,
            max_len: None,
        }])], None, None);

        let outcome = flow_mod_add_and_reprocess(&tables, 0, entry, false, Some(id), &store, &groups, &registry, &pool(), meter)
            .unwrap()
            .expect("a buffer_id was given");

        assert_eq!(outcome, ExecuteOutcome::Transmitted);
        assert!(registry.with_entry(3, |e| e.driver.read().unwrap().is_some()).unwrap());
        assert!(store.take(id).is_none());
    }

    #[test]
    fn flow_mod_add_without_buffer_id_returns_none() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry: PortRegistry<TestBuffer, TestBufferPool> = PortRegistry::default();
        let groups = GroupTable::new();
        let tables = PipelineTables::new(1).unwrap();
        let meter: &dyn Fn(u32) -> bool = &|_| true;

        let entry = FlowEntry::new(1, 10, xdpd_flow_entry::Match::default(), vec![], None, None);
        let outcome = flow_mod_add_and_reprocess(&tables, 0, entry, false, None, &store, &groups, &registry, &pool(), meter).unwrap();

        assert!(outcome.is_none());
    }

    #[test]
    fn group_mod_add_with_buffer_id_redelivers_through_the_new_group() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry = registry_with_virtual_port(4);
        let groups = GroupTable::new();
        let tables = PipelineTables::new(1).unwrap();
        let meter: &dyn Fn(u32) -> bool = &|_| true;

        let table_entry = FlowEntry::new(1, 10, xdpd_flow_entry::Match::default(), vec![xdpd_flow_entry::Instruction::ApplyActions(vec![Action::Group(1)])], None, None);
        tables.table_at(0).unwrap().insert(table_entry, false).unwrap();

        let id = store.store(packet(), 9);
        let bucket = xdpd_flow_entry::Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![Action::Output { port: 4, max_len: None }],
        };

        let outcome = group_mod_add_and_reprocess(&groups, GroupId(1), GroupType::Indirect, vec![bucket], Some(id), &store, &tables, &registry, &pool(), meter)
            .unwrap()
            .expect("a buffer_id was given");

        assert_eq!(outcome, ExecuteOutcome::Transmitted);
        assert!(registry.with_entry(4, |e| e.driver.read().unwrap().is_some()).unwrap());
        assert!(store.take(id).is_none());
    }

    #[test]
    fn reprocess_with_an_expired_buffer_id_is_reported() {
        let store: BufferStore<TestBuffer> = BufferStore::new(crate::buffer_store::DEFAULT_TTL);
        let registry: PortRegistry<TestBuffer, TestBufferPool> = PortRegistry::default();
        let groups = GroupTable::new();
        let tables = PipelineTables::new(1).unwrap();
        let meter: &dyn Fn(u32) -> bool = &|_| true;

        let entry = FlowEntry::new(1, 10, xdpd_flow_entry::Match::default(), vec![], None, None);
        let err = flow_mod_add_and_reprocess(&tables, 0, entry, false, Some(404), &store, &groups, &registry, &pool(), meter).unwrap_err();

        assert_eq!(err, ReprocessError::BufferExpired(404));
    }
}
