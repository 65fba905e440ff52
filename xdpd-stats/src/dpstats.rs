// SPDX-License-Identifier: Apache-2.0

//! Flow, aggregate, and group statistics snapshots (§4.7 "Statistics").
//!
//! Each `get_*_stats` call here takes one consistent read of the live
//! tables and returns an owned copy; it never interleaves a partial update
//! from a concurrent flow-mod, because [`xdpd_flow_entry::FlowTable::snapshot`]
//! and [`xdpd_flow_entry::GroupTable::snapshot`] already take their lock for
//! the whole scan.

use metrics::{counter, gauge};
use xdpd_flow_entry::{FlowEntrySnapshot, FlowTable, GroupEntry, GroupTable, Match};

use tracing::debug;

xdpd_tracectl::trace_target!("dp-stats", xdpd_tracectl::LevelFilter::INFO, &[]);

/// One row of a `get_flow_stats` reply.
#[derive(Debug, Clone)]
pub struct FlowStats {
    pub table_id: u8,
    pub priority: u16,
    pub cookie: u64,
    pub table_match: Match,
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration: std::time::Duration,
}

/// The summed reply to `get_aggregate_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u64,
}

/// One row of a `get_group_desc_stats` reply: a group's descriptive shape
/// (type and bucket action lists), with no counters.
#[derive(Debug, Clone)]
pub struct GroupDescStats {
    pub entry: GroupEntry,
}

/// One row of a `get_group_stats` reply: an installed group's live
/// per-bucket packet/byte counters, in bucket order (§4.7, §6.1).
#[derive(Debug, Clone)]
pub struct GroupStats {
    pub id: xdpd_flow_entry::GroupId,
    pub bucket_packet_counts: Vec<u64>,
    pub bucket_byte_counts: Vec<u64>,
}

/// Take a `get_flow_stats`-style snapshot of every entry in `table_id`,
/// optionally restricted to entries whose match is a superset of `filter`
/// (the controller's "match template" restriction; `None` returns every
/// entry).
#[must_use]
pub fn flow_stats(table_id: u8, table: &FlowTable, filter: Option<&Match>) -> Vec<FlowStats> {
    table
        .snapshot()
        .into_iter()
        .filter(|entry| filter.is_none_or(|f| f.is_subset_of(&entry.table_match)))
        .map(|entry: FlowEntrySnapshot| FlowStats {
            table_id,
            priority: entry.priority,
            cookie: entry.cookie,
            table_match: entry.table_match,
            packet_count: entry.packet_count,
            byte_count: entry.byte_count,
            duration: entry.duration,
        })
        .collect()
}

/// Sum every entry in `table_id` matching `filter` into one
/// `get_aggregate_stats` reply.
#[must_use]
pub fn aggregate_stats(table_id: u8, table: &FlowTable, filter: Option<&Match>) -> AggregateStats {
    let mut out = AggregateStats::default();
    for entry in flow_stats(table_id, table, filter) {
        out.packet_count += entry.packet_count;
        out.byte_count += entry.byte_count;
        out.flow_count += 1;
    }
    out
}

/// `get_group_desc_stats`: every currently-installed group.
#[must_use]
pub fn group_desc_stats(groups: &GroupTable) -> Vec<GroupDescStats> {
    groups.snapshot().into_iter().map(|entry| GroupDescStats { entry }).collect()
}

/// `get_group_stats`: live per-bucket packet/byte counters for every
/// currently-installed group (§4.7, §6.1). A group that was deleted
/// between the descriptive snapshot and the counter read is simply
/// omitted rather than reported with stale zeros.
#[must_use]
pub fn group_stats(groups: &GroupTable) -> Vec<GroupStats> {
    groups
        .snapshot()
        .into_iter()
        .filter_map(|entry| {
            let (bucket_packet_counts, bucket_byte_counts) = groups.bucket_stats(entry.id)?.into_iter().unzip();
            Some(GroupStats {
                id: entry.id,
                bucket_packet_counts,
                bucket_byte_counts,
            })
        })
        .collect()
}

/// Port-level counters a switch port exposes to the metrics facility and to
/// `PORT_STATS` replies: the four drop/error tallies named in §7's error
/// taxonomy, published as gauges labeled by `port_num` so an operator's
/// existing metrics collector (Prometheus via the `metrics` crate's
/// exporter, wired up by the binary) can scrape them without this crate
/// knowing anything about the transport.
pub fn publish_port_counters(port_num: u32, rx_dropped: u64, tx_dropped: u64, tx_errors: u64, overrun: u64) {
    let label = port_num.to_string();
    gauge!("xdpd_port_rx_dropped", "port" => label.clone()).set(rx_dropped as f64);
    gauge!("xdpd_port_tx_dropped", "port" => label.clone()).set(tx_dropped as f64);
    gauge!("xdpd_port_tx_errors", "port" => label.clone()).set(tx_errors as f64);
    gauge!("xdpd_port_queue_overrun", "port" => label).set(overrun as f64);
    debug!(port_num, rx_dropped, tx_dropped, tx_errors, overrun, "published port counters");
}

/// Increment the per-switch packet-in counters exposed through the metrics
/// facility (delivered vs. dropped-by-PIRL), so PIRL pressure is visible
/// without waiting on a controller stats request.
pub fn record_packet_in(dpid: u64, delivered: bool) {
    let label = format!("{dpid:#x}");
    if delivered {
        counter!("xdpd_packet_in_total", "dpid" => label).increment(1);
    } else {
        counter!("xdpd_packet_in_dropped_total", "dpid" => label).increment(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use xdpd_flow_entry::FlowEntry;

    #[test]
    fn aggregate_sums_every_matching_entry() {
        let table = FlowTable::new();
        table
            .insert(FlowEntry::new(1, 1, Match::default(), vec![], None, None), false)
            .unwrap();
        table
            .insert(FlowEntry::new(2, 2, Match::default(), vec![], None, None), false)
            .unwrap();

        let agg = aggregate_stats(0, &table, None);
        assert_eq!(agg.flow_count, 2);
        assert_eq!(agg.packet_count, 0);
    }

    #[test]
    fn flow_stats_reports_table_id_and_cookie() {
        let table = FlowTable::new();
        table
            .insert(FlowEntry::new(5, 42, Match::default(), vec![], None, None), false)
            .unwrap();

        let stats = flow_stats(3, &table, None);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].table_id, 3);
        assert_eq!(stats[0].cookie, 42);
    }

    #[test]
    fn group_stats_reports_bucket_counters_in_bucket_order() {
        let groups = GroupTable::new();
        let entry = GroupEntry::new(
            xdpd_flow_entry::GroupId(3),
            xdpd_flow_entry::GroupType::All,
            vec![
                xdpd_flow_entry::Bucket {
                    weight: 1,
                    watch_port: None,
                    watch_group: None,
                    actions: vec![],
                },
                xdpd_flow_entry::Bucket {
                    weight: 1,
                    watch_port: None,
                    watch_group: None,
                    actions: vec![],
                },
            ],
        )
        .unwrap();
        groups.insert(entry);
        groups.record_bucket_hit(xdpd_flow_entry::GroupId(3), 1, 64);

        let stats = group_stats(&groups);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].bucket_packet_counts, vec![0, 1]);
        assert_eq!(stats[0].bucket_byte_counts, vec![0, 64]);
    }

    #[test]
    fn group_desc_stats_lists_every_installed_group() {
        let groups = GroupTable::new();
        let entry = GroupEntry::new(
            xdpd_flow_entry::GroupId(9),
            xdpd_flow_entry::GroupType::Indirect,
            vec![xdpd_flow_entry::Bucket {
                weight: 1,
                watch_port: None,
                watch_group: None,
                actions: vec![],
            }],
        )
        .unwrap();
        groups.insert(entry);

        let stats = group_desc_stats(&groups);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].entry.id, xdpd_flow_entry::GroupId(9));
    }
}
