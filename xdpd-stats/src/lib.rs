// SPDX-License-Identifier: Apache-2.0

//! Flow/group/aggregate statistics snapshots and port-counter publication
//! (§4.7 "Flow/group/table administration" — the statistics half; the
//! mutation half lives in `xdpd-admin`).

mod dpstats;

pub use dpstats::{
    aggregate_stats, flow_stats, group_desc_stats, publish_port_counters, record_packet_in, AggregateStats,
    FlowStats, GroupDescStats,
};
