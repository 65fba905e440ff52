// SPDX-License-Identifier: Apache-2.0

//! Multi-table pipeline dispatch (§4.5 "Pipeline dispatcher"): walk a
//! packet through an ordered sequence of flow tables starting at table 0,
//! executing each matched entry's instructions in their fixed order, until
//! a terminal action or a table-miss is reached.

use xdpd_flow_entry::instruction::in_execution_order;
use xdpd_flow_entry::table::TableId;
use xdpd_flow_entry::{Action, FlowTable, Instruction};
use xdpd_net::buffer::PacketBufferMut;
use xdpd_net::classifier::ClassifierState;
use xdpd_net::headers::Headers;
use xdpd_net::packet::Packet;

/// What a table does with a packet that matched no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissBehavior {
    /// Send the packet to the controller as a packet-in.
    Controller,
    /// Fall through to the next table as if it had matched nothing.
    Continue,
    /// Drop the packet silently.
    Drop,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineTablesError {
    #[error("num_tables must be in 1..=32, got {0}")]
    OutOfRange(u8),
}

/// One logical switch's ordered table array (§3 "Logical switch": `a
/// fixed-size table array (bounded by ~32)`). Tables are addressed by
/// position; `GOTO_TABLE` may only target a later position (§3 invariant).
pub struct PipelineTables {
    tables: Vec<(TableId, FlowTable, MissBehavior)>,
}

impl PipelineTables {
    /// Build `num_tables` empty tables, each defaulting to `Controller`
    /// miss behavior (the common OpenFlow table-miss default).
    pub fn new(num_tables: u8) -> Result<Self, PipelineTablesError> {
        if num_tables == 0 || num_tables > 32 {
            return Err(PipelineTablesError::OutOfRange(num_tables));
        }
        let tables = (0..num_tables)
            .map(|_| (TableId::new(), FlowTable::new(), MissBehavior::Controller))
            .collect();
        Ok(PipelineTables { tables })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn set_miss_behavior(&mut self, position: usize, miss: MissBehavior) {
        if let Some(entry) = self.tables.get_mut(position) {
            entry.2 = miss;
        }
    }

    #[must_use]
    pub fn table_at(&self, position: usize) -> Option<&FlowTable> {
        self.tables.get(position).map(|(_, table, _)| table)
    }

    fn position_of(&self, id: TableId) -> Option<usize> {
        self.tables.iter().position(|(table_id, _, _)| *table_id == id)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("GOTO_TABLE target {target} does not strictly exceed the current table position {from}")]
    NonMonotonicGoto { from: usize, target: usize },
    #[error("GOTO_TABLE referenced an unknown table id")]
    UnknownTable,
}

/// Outcome of walking a packet through [`PipelineTables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No entry matched in a table whose miss behavior is `Drop`, or no
    /// table ran at all (empty table array).
    Dropped,
    /// A table-miss occurred in a table configured `CONTROLLER`.
    PacketIn,
    /// A terminal `OUTPUT`/`GROUP` action was reached (or `WRITE_ACTIONS`
    /// accumulated and the traversal ran out of `GOTO_TABLE`s): the
    /// ordered action list to hand to the action executor (§4.6).
    Execute(Vec<Action>),
}

/// Last-writer-wins-per-kind accumulator for `WRITE_ACTIONS`, mirroring
/// `xdpd_net::packet::WriteActions` but over the typed [`Action`] so the
/// dispatcher never needs to round-trip through bytes.
#[derive(Debug, Default)]
struct WrittenActions(Vec<Action>);

impl WrittenActions {
    fn write_all(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.0.retain(|existing| existing.kind() != action.kind());
            self.0.push(action);
        }
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn into_vec(self) -> Vec<Action> {
        self.0
    }
}

fn is_terminal(action: &Action) -> bool {
    matches!(action, Action::Output { .. } | Action::Group(_) | Action::Drop)
}

/// Walk `packet` through `tables` starting at position 0. `meter_allows`
/// gates `METER` instructions (an external collaborator decides whether a
/// meter band admits the packet; pass `|_| true` if meters are unused).
pub fn dispatch<Buf: PacketBufferMut>(
    packet: &Packet<Buf>,
    in_port: u32,
    tables: &PipelineTables,
    mut meter_allows: impl FnMut(u32) -> bool,
) -> Result<DispatchOutcome, DispatchError> {
    let headers: &Headers = packet.headers();
    let state: &ClassifierState = &headers.state;
    let bytes = packet.len() as u64;

    let mut position = 0usize;
    let mut written = WrittenActions::default();
    let mut applied: Vec<Action> = Vec::new();

    loop {
        let Some(table) = tables.table_at(position) else {
            return Ok(DispatchOutcome::Dropped);
        };
        let Some(entry_id) = table.lookup(in_port, headers, state, bytes) else {
            return Ok(match tables.tables[position].2 {
                MissBehavior::Controller => DispatchOutcome::PacketIn,
                MissBehavior::Continue => {
                    position += 1;
                    continue;
                }
                MissBehavior::Drop => DispatchOutcome::Dropped,
            });
        };
        let _ = entry_id; // bookkeeping id only; the match already recorded the hit.

        // table.lookup only hands back an id; re-walk for the instructions.
        // (FlowTable intentionally exposes no "fetch instructions by id"
        // accessor outside its own module, so dispatch asks it to match
        // again through a dedicated accessor.)
        let Some(mut instructions) = table.instructions_for(in_port, headers, state) else {
            return Ok(DispatchOutcome::Dropped);
        };
        in_execution_order(&mut instructions);

        let mut goto: Option<TableId> = None;
        for instruction in instructions {
            match instruction {
                Instruction::Meter(id) => {
                    if !meter_allows(id) {
                        return Ok(DispatchOutcome::Dropped);
                    }
                }
                Instruction::ApplyActions(actions) => {
                    if let Some(terminal_index) = actions.iter().position(is_terminal) {
                        applied.extend(actions.into_iter().take(terminal_index + 1));
                        let mut out = written.into_vec();
                        out.extend(applied);
                        return Ok(DispatchOutcome::Execute(out));
                    }
                    applied.extend(actions);
                }
                Instruction::ClearActions => written.clear(),
                Instruction::WriteActions(actions) => written.write_all(actions),
                Instruction::WriteMetadata { .. } => {
                    // Metadata threading across tables is a non-goal of this
                    // core's data model (no OXM metadata match is exposed
                    // yet); accepted and discarded so GOTO_TABLE chains
                    // using it don't hard-fail.
                }
                Instruction::GotoTable(target) => goto = Some(target),
            }
        }

        match goto {
            Some(target) => {
                let target_position = tables.position_of(target).ok_or(DispatchError::UnknownTable)?;
                if target_position <= position {
                    return Err(DispatchError::NonMonotonicGoto {
                        from: position,
                        target: target_position,
                    });
                }
                position = target_position;
            }
            None => {
                let mut out = written.into_vec();
                out.extend(applied);
                if out.is_empty() {
                    return Ok(DispatchOutcome::Dropped);
                }
                return Ok(DispatchOutcome::Execute(out));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use etherparse::PacketBuilder;
    use xdpd_flow_entry::matching::Match;
    use xdpd_flow_entry::table::FlowEntry;
    use xdpd_net::buffer::TestBuffer;

    fn frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let payload = b"x";
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    fn packet() -> Packet<TestBuffer> {
        let bytes = frame();
        let buf = TestBuffer::new(&bytes, 64, 64);
        Packet::new(buf, None, true).unwrap()
    }

    #[test]
    fn table_miss_with_controller_behavior_produces_packet_in() {
        let tables = PipelineTables::new(1).unwrap();
        let packet = packet();
        let outcome = dispatch(&packet, 1, &tables, |_| true).unwrap();
        assert_eq!(outcome, DispatchOutcome::PacketIn);
    }

    #[test]
    fn matching_entry_with_output_action_terminates_with_execute() {
        let tables = PipelineTables::new(1).unwrap();
        let table = tables.table_at(0).unwrap();
        table
            .insert(
                FlowEntry::new(
                    1,
                    1,
                    Match::default(),
                    vec![Instruction::ApplyActions(vec![Action::Output {
                        port: 2,
                        max_len: None,
                    }])],
                    None,
                    None,
                ),
                false,
            )
            .unwrap();
        let packet = packet();
        let outcome = dispatch(&packet, 1, &tables, |_| true).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Execute(vec![Action::Output { port: 2, max_len: None }])
        );
    }

    #[test]
    fn denied_meter_drops_before_reaching_terminal_action() {
        let tables = PipelineTables::new(1).unwrap();
        let table = tables.table_at(0).unwrap();
        table
            .insert(
                FlowEntry::new(
                    1,
                    1,
                    Match::default(),
                    vec![
                        Instruction::Meter(5),
                        Instruction::ApplyActions(vec![Action::Output { port: 2, max_len: None }]),
                    ],
                    None,
                    None,
                ),
                false,
            )
            .unwrap();
        let packet = packet();
        let outcome = dispatch(&packet, 1, &tables, |meter| meter != 5).unwrap();
        assert_eq!(outcome, DispatchOutcome::Dropped);
    }
}
