// SPDX-License-Identifier: Apache-2.0

//! The control-plane surface above the data path: flow/group/table
//! administration (§4.7), controller OXM translation (§4.8), and the
//! packet-in rate limiter (§4.9).

pub mod admin;
pub mod error;
pub mod oxm;
pub mod pirl;

pub use admin::{flow_mod_add, flow_mod_delete, flow_mod_modify, group_mod_add, group_mod_delete, group_mod_modify, ALL_TABLES};
pub use error::AdminError;
pub use oxm::{translate_actions, translate_match, OxmAction, OxmField, TranslationError};
pub use pirl::{Pirl, PirlConfig, UNLIMITED};
// Statistics snapshots (`flow_stats`/`aggregate_stats`/`group_desc_stats`/
// `group_stats`) and port-counter/packet-in metrics publication live in
// `xdpd-stats`, not here: the mutation half of §4.7 is this crate's job, the
// read-only half is a sibling crate so a stats-only consumer doesn't pull in
// flow/group mutation.
pub use xdpd_stats::{
    aggregate_stats, flow_stats, group_desc_stats, group_stats, publish_port_counters, record_packet_in, AggregateStats, FlowStats, GroupDescStats, GroupStats,
};
