// SPDX-License-Identifier: Apache-2.0

//! Flow/group/table administration (§4.7): the surface a decoded
//! FLOW_MOD/GROUP_MOD message is applied through once its OXM payload has
//! already been translated (§4.8, [`crate::oxm`]) into typed [`Match`] and
//! [`Action`] values.

use xdpd_flow_entry::{FlowEntry, FlowTableError, GroupEntry, GroupId, GroupTable, GroupType, Instruction, Match};
use xdpd_pipeline::PipelineTables;

use crate::error::AdminError;

/// `table_id = 0xFF`: "all tables" (§4.7).
pub const ALL_TABLES: u8 = 0xFF;

fn table_range(tables: &PipelineTables, table_id: u8) -> Result<Vec<usize>, AdminError> {
    if table_id == ALL_TABLES {
        return Ok((0..tables.len()).collect());
    }
    let position = table_id as usize;
    if position >= tables.len() {
        return Err(AdminError::InvalidTable(table_id));
    }
    Ok(vec![position])
}

/// `FLOW_MOD ADD`/`MODIFY`: install `entry` into the table at `table_id`.
/// `table_id` may not be [`ALL_TABLES`] for an add (there is no single
/// table to insert into).
pub fn flow_mod_add(tables: &PipelineTables, table_id: u8, entry: FlowEntry, check_overlap: bool) -> Result<(), AdminError> {
    if table_id == ALL_TABLES {
        return Err(AdminError::InvalidTable(table_id));
    }
    let table = tables.table_at(table_id as usize).ok_or(AdminError::InvalidTable(table_id))?;
    table.insert(entry, check_overlap).map_err(|err| match err {
        FlowTableError::OverlapsExistingEntry { priority } => AdminError::FlowModOverlap { priority },
        FlowTableError::CookieNotFound(cookie) => AdminError::FlowModNotFound(cookie),
    })
}

/// `FLOW_MOD MODIFY`/`MODIFY_STRICT` (§4.7): update the instruction list of
/// every installed entry `template` selects, across `table_id` or (for
/// [`ALL_TABLES`]) every table, resetting its counters when `reset_counts`
/// is set. Strict mode (`priority` `Some`) requires an exact
/// `{match, priority}` pair; non-strict mode (`priority` `None`) updates
/// every entry whose match is a superset of `template`. `MODIFY` never
/// inserts: a template matching nothing in any scanned table is reported
/// as [`AdminError::FlowModNotFound`].
pub fn flow_mod_modify(
    tables: &PipelineTables,
    table_id: u8,
    template: &Match,
    priority: Option<u16>,
    instructions: Vec<Instruction>,
    reset_counts: bool,
) -> Result<(), AdminError> {
    let mut touched = 0;
    for position in table_range(tables, table_id)? {
        if let Some(table) = tables.table_at(position) {
            touched += table.modify(template, priority, &instructions, reset_counts);
        }
    }
    if touched > 0 {
        Ok(())
    } else {
        Err(AdminError::FlowModModifyNotFound)
    }
}

/// `FLOW_MOD DELETE`: remove every entry matching `cookie` from `table_id`,
/// or from every table when `table_id` is [`ALL_TABLES`]. Succeeds as soon
/// as the cookie is found in any scanned table; `out_port`/`out_group`
/// restriction filtering is not modeled (the matching engine's richer
/// per-field delete is a matching-engine concern, §1 Non-goals).
pub fn flow_mod_delete(tables: &PipelineTables, table_id: u8, cookie: u64) -> Result<(), AdminError> {
    let mut found = false;
    for position in table_range(tables, table_id)? {
        if let Some(table) = tables.table_at(position) {
            if table.remove_by_cookie(cookie).is_ok() {
                found = true;
            }
        }
    }
    if found {
        Ok(())
    } else {
        Err(AdminError::FlowModNotFound(cookie))
    }
}

/// `GROUP_MOD ADD`: validate and install a new group (bucket-count
/// invariants are enforced by [`GroupEntry::new`]; a `GROUP` action or
/// `watch_group` reference chain that would cycle back to `id` is rejected
/// per §4.7's "loop detection").
pub fn group_mod_add(groups: &GroupTable, id: GroupId, group_type: GroupType, buckets: Vec<xdpd_flow_entry::Bucket>) -> Result<(), AdminError> {
    let entry = GroupEntry::new(id, group_type, buckets).map_err(xdpd_flow_entry::GroupTableError::from)?;
    if groups.creates_loop(&entry) {
        return Err(AdminError::Group(xdpd_flow_entry::GroupTableError::Loop(id)));
    }
    groups.insert(entry);
    Ok(())
}

/// `GROUP_MOD MODIFY`: replace an existing group's definition in place.
/// Fails with [`AdminError::Group`] if `id` was never installed — a modify
/// of an unknown group is a controller error, not an implicit add — or if
/// the new definition would create a reference cycle.
pub fn group_mod_modify(groups: &GroupTable, id: GroupId, group_type: GroupType, buckets: Vec<xdpd_flow_entry::Bucket>) -> Result<(), AdminError> {
    if groups.get(id).is_none() {
        return Err(AdminError::Group(xdpd_flow_entry::GroupTableError::Unknown(id)));
    }
    let entry = GroupEntry::new(id, group_type, buckets).map_err(xdpd_flow_entry::GroupTableError::from)?;
    if groups.creates_loop(&entry) {
        return Err(AdminError::Group(xdpd_flow_entry::GroupTableError::Loop(id)));
    }
    groups.insert(entry);
    Ok(())
}

/// `GROUP_MOD DELETE`. Cascading removal of flow-entry `GROUP` references
/// (§4.7) is not performed here: [`xdpd_flow_entry::table::FlowTable`]
/// exposes installed entries only as read-only [`xdpd_flow_entry::table::FlowEntrySnapshot`]s
/// with no instruction payload, so the admin plane cannot itself rewrite a
/// referencing entry's action list. Callers that need the "must not leave
/// dangling references" guarantee are expected to reject the delete
/// up-front (the controller tracks which flow entries reference which
/// groups) rather than rely on this call to cascade.
pub fn group_mod_delete(groups: &GroupTable, id: GroupId) -> Result<(), AdminError> {
    groups.remove(id).map_err(AdminError::from)
}

#[cfg(test)]
mod test {
    use super::*;
    use xdpd_flow_entry::{Bucket, Match};

    #[test]
    fn add_into_all_tables_sentinel_is_rejected() {
        let tables = PipelineTables::new(2).unwrap();
        let entry = FlowEntry::new(1, 1, Match::default(), vec![], None, None);
        let err = flow_mod_add(&tables, ALL_TABLES, entry, false).unwrap_err();
        assert_eq!(err, AdminError::InvalidTable(ALL_TABLES));
    }

    #[test]
    fn add_out_of_range_table_is_rejected() {
        let tables = PipelineTables::new(2).unwrap();
        let entry = FlowEntry::new(1, 1, Match::default(), vec![], None, None);
        let err = flow_mod_add(&tables, 9, entry, false).unwrap_err();
        assert_eq!(err, AdminError::InvalidTable(9));
    }

    #[test]
    fn delete_with_all_tables_finds_entry_wherever_it_lives() {
        let tables = PipelineTables::new(3).unwrap();
        let entry = FlowEntry::new(1, 77, Match::default(), vec![], None, None);
        flow_mod_add(&tables, 1, entry, false).unwrap();
        flow_mod_delete(&tables, ALL_TABLES, 77).unwrap();
        assert_eq!(tables.table_at(1).unwrap().len(), 0);
    }

    #[test]
    fn modify_strict_updates_an_installed_entry_in_place() {
        let tables = PipelineTables::new(1).unwrap();
        flow_mod_add(&tables, 0, FlowEntry::new(10, 1, Match::default(), vec![], None, None), false).unwrap();
        flow_mod_modify(&tables, 0, &Match::default(), Some(10), vec![Instruction::ClearActions], false).unwrap();
        assert_eq!(tables.table_at(0).unwrap().len(), 1);
    }

    #[test]
    fn modify_matching_nothing_is_reported_as_not_found() {
        let tables = PipelineTables::new(1).unwrap();
        let template = Match {
            eth_type: Some(0x86dd),
            ..Match::default()
        };
        let err = flow_mod_modify(&tables, 0, &template, None, vec![], false).unwrap_err();
        assert_eq!(err, AdminError::FlowModModifyNotFound);
    }

    #[test]
    fn delete_unknown_cookie_errors() {
        let tables = PipelineTables::new(1).unwrap();
        let err = flow_mod_delete(&tables, 0, 404).unwrap_err();
        assert_eq!(err, AdminError::FlowModNotFound(404));
    }

    #[test]
    fn group_add_then_delete_round_trips() {
        let groups = GroupTable::new();
        let bucket = Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![],
        };
        group_mod_add(&groups, GroupId(1), GroupType::Indirect, vec![bucket]).unwrap();
        assert_eq!(groups.len(), 1);
        group_mod_delete(&groups, GroupId(1)).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn modify_unknown_group_errors() {
        let groups = GroupTable::new();
        let err = group_mod_modify(&groups, GroupId(9), GroupType::All, vec![]).unwrap_err();
        assert_eq!(err, AdminError::Group(xdpd_flow_entry::GroupTableError::Unknown(GroupId(9))));
    }

    #[test]
    fn group_add_rejects_a_self_referencing_bucket() {
        let groups = GroupTable::new();
        let bucket = Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![xdpd_flow_entry::Action::Group(1)],
        };
        let err = group_mod_add(&groups, GroupId(1), GroupType::Indirect, vec![bucket]).unwrap_err();
        assert_eq!(err, AdminError::Group(xdpd_flow_entry::GroupTableError::Loop(GroupId(1))));
        assert!(groups.is_empty());
    }

    #[test]
    fn group_modify_rejects_a_cycle_through_an_installed_group() {
        let groups = GroupTable::new();
        group_mod_add(&groups, GroupId(1), GroupType::Indirect, vec![Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![],
        }])
        .unwrap();
        group_mod_add(&groups, GroupId(2), GroupType::Indirect, vec![Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![xdpd_flow_entry::Action::Group(1)],
        }])
        .unwrap();

        // Rewriting group 1 to point at group 2 closes a 1 -> 2 -> 1 cycle.
        let err = group_mod_modify(&groups, GroupId(1), GroupType::Indirect, vec![Bucket {
            weight: 1,
            watch_port: None,
            watch_group: None,
            actions: vec![xdpd_flow_entry::Action::Group(2)],
        }])
        .unwrap_err();
        assert_eq!(err, AdminError::Group(xdpd_flow_entry::GroupTableError::Loop(GroupId(1))));
    }
}
