// SPDX-License-Identifier: Apache-2.0

//! Group entries: multi-bucket forwarding (§3 "Group entry").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use xdpd_concurrency::sync::RwLock;

use crate::action::Action;

/// The wire group identifier (controller-assigned, `OFPG_*` reserved
/// values excluded — table admin rejects those at creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    /// Execute every bucket (flood/multicast replication).
    All,
    /// Execute exactly one bucket, selected by a hash of the packet
    /// (ECMP-style load balancing).
    Select,
    /// Execute the (single) bucket unconditionally — a level of
    /// indirection for shared next-hop action lists.
    Indirect,
    /// Execute the first bucket whose `watch_port`/`watch_group` is live.
    FastFailover,
}

/// One bucket: a weighted action list plus optional liveness watch used
/// by `FastFailover` groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub weight: u16,
    pub watch_port: Option<u32>,
    pub watch_group: Option<GroupId>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub id: GroupId,
    pub group_type: GroupType,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupEntryError {
    #[error("group entry must have at least one bucket")]
    NoBuckets,
    #[error("an indirect group must have exactly one bucket, got {0}")]
    IndirectMustHaveOneBucket(usize),
}

impl GroupEntry {
    pub fn new(id: GroupId, group_type: GroupType, buckets: Vec<Bucket>) -> Result<Self, GroupEntryError> {
        if buckets.is_empty() {
            return Err(GroupEntryError::NoBuckets);
        }
        if group_type == GroupType::Indirect && buckets.len() != 1 {
            return Err(GroupEntryError::IndirectMustHaveOneBucket(buckets.len()));
        }
        Ok(GroupEntry {
            id,
            group_type,
            buckets,
        })
    }

    /// Every group this entry's buckets can reach in one hop: a `GROUP`
    /// action in the bucket's action list, or a `watch_group` liveness
    /// reference (§4.7 "loop detection" walks both).
    fn referenced_groups(&self) -> Vec<GroupId> {
        let mut refs = Vec::new();
        for bucket in &self.buckets {
            if let Some(watch_group) = bucket.watch_group {
                refs.push(watch_group);
            }
            for action in &bucket.actions {
                if let Action::Group(id) = action {
                    refs.push(GroupId(*id));
                }
            }
        }
        refs
    }

    /// Select which bucket(s) to execute for one packet, paired with each
    /// bucket's index in [`Self::buckets`] so the caller can attribute
    /// per-bucket hit counters. `select_hash` is the caller-computed hash
    /// used by `Select` groups; `port_is_live` answers liveness queries for
    /// `FastFailover`.
    #[must_use]
    pub fn buckets_to_execute(&self, select_hash: u32, port_is_live: impl Fn(u32) -> bool) -> Vec<(usize, &Bucket)> {
        match self.group_type {
            GroupType::All | GroupType::Indirect => self.buckets.iter().enumerate().collect(),
            GroupType::Select => {
                let total_weight: u32 = self.buckets.iter().map(|b| u32::from(b.weight.max(1))).sum();
                if total_weight == 0 {
                    return Vec::new();
                }
                let mut target = select_hash % total_weight;
                for (index, bucket) in self.buckets.iter().enumerate() {
                    let weight = u32::from(bucket.weight.max(1));
                    if target < weight {
                        return vec![(index, bucket)];
                    }
                    target -= weight;
                }
                Vec::new()
            }
            GroupType::FastFailover => self
                .buckets
                .iter()
                .enumerate()
                .find(|(_, b)| b.watch_port.is_none_or(&port_is_live))
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupTableError {
    #[error("no group with id {0:?} found")]
    Unknown(GroupId),
    #[error(transparent)]
    Entry(#[from] GroupEntryError),
    #[error("installing group {0:?} would create a GROUP action reference cycle")]
    Loop(GroupId),
}

/// A bucket's live packet/byte counters, indexed by position in its
/// group's bucket list. Kept out of [`Bucket`] itself so `GroupEntry`
/// stays plain-data and cheap to clone out of the table for execution.
#[derive(Debug, Default)]
struct BucketCounters {
    packet_count: AtomicU64,
    byte_count: AtomicU64,
}

/// The per-switch group table (§4.7 "Group-mod ADD/MODIFY/DELETE"). A flow
/// entry's `GROUP` action resolves through here; deleting a group that a
/// flow entry still references is the caller's responsibility to check
/// first — this table only tracks groups, not back-references.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: RwLock<HashMap<GroupId, GroupEntry>>,
    bucket_counters: RwLock<HashMap<GroupId, Vec<BucketCounters>>>,
}

impl GroupTable {
    #[must_use]
    pub fn new() -> Self {
        GroupTable {
            groups: RwLock::new(HashMap::new()),
            bucket_counters: RwLock::new(HashMap::new()),
        }
    }

    /// Installs (or, for a MODIFY, replaces) `entry`. A replace resets its
    /// bucket counters to zero, matching the OpenFlow MODIFY semantics for
    /// statistics elsewhere in this datapath (§4.7 "RESET_COUNTS").
    pub fn insert(&self, entry: GroupEntry) {
        let counters = (0..entry.buckets.len()).map(|_| BucketCounters::default()).collect();
        self.bucket_counters.write().unwrap().insert(entry.id, counters);
        self.groups.write().unwrap().insert(entry.id, entry);
    }

    /// Record one packet of `bytes` having been sent out `bucket_index` of
    /// `group_id`, for `get_group_stats` (§4.7, §6.1). A no-op if the group
    /// or bucket no longer exists (raced a concurrent delete/modify).
    pub fn record_bucket_hit(&self, group_id: GroupId, bucket_index: usize, bytes: u64) {
        let counters = self.bucket_counters.read().unwrap();
        if let Some(Some(bucket)) = counters.get(&group_id).map(|b| b.get(bucket_index)) {
            bucket.packet_count.fetch_add(1, Ordering::Relaxed);
            bucket.byte_count.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Each bucket's `(packet_count, byte_count)`, in bucket order, for
    /// `get_group_stats`. `None` if `group_id` is not installed.
    #[must_use]
    pub fn bucket_stats(&self, group_id: GroupId) -> Option<Vec<(u64, u64)>> {
        self.bucket_counters.read().unwrap().get(&group_id).map(|buckets| {
            buckets
                .iter()
                .map(|b| (b.packet_count.load(Ordering::Relaxed), b.byte_count.load(Ordering::Relaxed)))
                .collect()
        })
    }

    /// Walk `candidate`'s `GROUP`-action and `watch_group` references
    /// transitively through whatever is already installed, reporting
    /// whether the walk ever reaches back to `candidate.id` (§4.7 "loop
    /// detection"). `candidate` stands in for its own id in the table, so
    /// a MODIFY that is itself what breaks a prior cycle is judged against
    /// its new definition, not its old one.
    #[must_use]
    pub fn creates_loop(&self, candidate: &GroupEntry) -> bool {
        let groups = self.groups.read().unwrap();
        let mut visited = std::collections::HashSet::new();
        let mut frontier = candidate.referenced_groups();
        while let Some(next) = frontier.pop() {
            if next == candidate.id {
                return true;
            }
            if !visited.insert(next) {
                continue;
            }
            if let Some(entry) = groups.get(&next) {
                frontier.extend(entry.referenced_groups());
            }
        }
        false
    }

    #[must_use]
    pub fn get(&self, id: GroupId) -> Option<GroupEntry> {
        self.groups.read().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: GroupId) -> Result<(), GroupTableError> {
        self.bucket_counters.write().unwrap().remove(&id);
        self.groups
            .write()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(GroupTableError::Unknown(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every installed group's descriptive shape, for
    /// `get_group_desc_stats` (§4.7). Per-bucket packet/byte counters are
    /// reported separately by [`Self::bucket_stats`].
    #[must_use]
    pub fn snapshot(&self) -> Vec<GroupEntry> {
        self.groups.read().unwrap().values().cloned().collect()
    }
}
