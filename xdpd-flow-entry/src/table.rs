// SPDX-License-Identifier: Apache-2.0

//! Per-table flow storage: priority-ordered lookup, install/modify/delete,
//! idle/hard timeout bookkeeping (§4.7 "Flow/group/table admin").

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;
use xdpd_concurrency::sync::RwLock;
use xdpd_id::Id;
use xdpd_net::classifier::ClassifierState;
use xdpd_net::headers::Headers;

use crate::instruction::Instruction;
use crate::matching::Match;
use crate::FlowEntryId;

/// Tag type for [`Id<TableTag>`]: one of the pipeline's ordered tables.
pub enum TableTag {}
pub type TableId = Id<TableTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutBasis {
    /// Idle timeout measured from the last packet that hit this entry.
    Idle(Duration),
    /// Hard timeout measured from installation, regardless of traffic.
    Hard(Duration),
}

/// One installed flow entry. Counters are atomics so the hot-path match
/// loop can update them under a shared (read) lock on the table.
#[derive(Debug)]
pub struct FlowEntry {
    pub id: FlowEntryId,
    pub priority: u16,
    pub cookie: u64,
    pub table_match: Match,
    pub instructions: Vec<Instruction>,
    pub idle_timeout: Option<Duration>,
    pub hard_timeout: Option<Duration>,
    installed_at: Instant,
    last_hit: AtomicU64,
    packet_count: AtomicU64,
    byte_count: AtomicU64,
}

impl FlowEntry {
    #[must_use]
    pub fn new(
        priority: u16,
        cookie: u64,
        table_match: Match,
        instructions: Vec<Instruction>,
        idle_timeout: Option<Duration>,
        hard_timeout: Option<Duration>,
    ) -> Self {
        let now = Instant::now();
        FlowEntry {
            id: FlowEntryId::new(),
            priority,
            cookie,
            table_match,
            instructions,
            idle_timeout,
            hard_timeout,
            installed_at: now,
            last_hit: AtomicU64::new(0),
            packet_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self, bytes: u64) {
        self.packet_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count.fetch_add(bytes, Ordering::Relaxed);
        self.last_hit
            .store(self.installed_at.elapsed().as_secs(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn packet_count(&self) -> u64 {
        self.packet_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.installed_at.elapsed()
    }

    /// True if this entry's idle or hard timeout has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        if let Some(hard) = self.hard_timeout {
            if self.installed_at.elapsed() >= hard {
                return true;
            }
        }
        if let Some(idle) = self.idle_timeout {
            let last_hit_secs = self.last_hit.load(Ordering::Relaxed);
            let idle_since = Duration::from_secs(last_hit_secs).max(Duration::ZERO);
            if self.installed_at.elapsed().saturating_sub(idle_since) >= idle {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowTableError {
    #[error("an entry already exists at priority {priority} with an overlapping match, and OFPFF_CHECK_OVERLAP was requested")]
    OverlapsExistingEntry { priority: u16 },
    #[error("no entry with cookie {0:#x} found")]
    CookieNotFound(u64),
}

/// One flow table: a priority-ordered `Vec`, kept sorted on insert. Linear
/// scan is the right tradeoff at the entry counts a single software
/// datapath table actually holds (tens to low thousands); a decision tree
/// or trie is out of scope (§1 Non-goals).
#[derive(Debug, Default)]
pub struct FlowTable {
    entries: RwLock<Vec<FlowEntry>>,
}

impl FlowTable {
    #[must_use]
    pub fn new() -> Self {
        FlowTable {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Install a new entry, checking for an overlapping equal-priority
    /// match when `check_overlap` is set (the `OFPFF_CHECK_OVERLAP` flow
    /// mod flag).
    pub fn insert(&self, entry: FlowEntry, check_overlap: bool) -> Result<(), FlowTableError> {
        let mut entries = self.entries.write().unwrap();
        if check_overlap {
            for existing in entries.iter() {
                if existing.priority == entry.priority
                    && (existing.table_match.is_subset_of(&entry.table_match)
                        || entry.table_match.is_subset_of(&existing.table_match))
                {
                    return Err(FlowTableError::OverlapsExistingEntry {
                        priority: entry.priority,
                    });
                }
            }
        }
        let pos = entries
            .binary_search_by(|e| entry.priority.cmp(&e.priority))
            .unwrap_or_else(|p| p);
        debug!(priority = entry.priority, cookie = entry.cookie, "installing flow entry");
        entries.insert(pos, entry);
        Ok(())
    }

    /// `FLOW_MOD MODIFY`/`MODIFY_STRICT` (§4.7): replace the instruction
    /// list of every entry `template` selects, in place, leaving identity
    /// (priority, cookie, timeouts) untouched. Strict mode (`priority`
    /// `Some`) requires an exact `{match, priority}` pair and can touch at
    /// most one entry; non-strict mode (`priority` `None`) updates every
    /// entry whose match `template` is a subset of, which can be several.
    /// `reset_counts` zeroes packet/byte counters on every entry touched
    /// (`OFPFF_RESET_COUNTS`). Returns how many entries were updated.
    pub fn modify(&self, template: &Match, priority: Option<u16>, instructions: &[Instruction], reset_counts: bool) -> usize {
        let mut entries = self.entries.write().unwrap();
        let mut touched = 0;
        for entry in entries.iter_mut() {
            let selected = match priority {
                Some(p) => entry.priority == p && entry.table_match == *template,
                None => template.is_subset_of(&entry.table_match),
            };
            if !selected {
                continue;
            }
            entry.instructions = instructions.to_vec();
            if reset_counts {
                entry.packet_count.store(0, Ordering::Relaxed);
                entry.byte_count.store(0, Ordering::Relaxed);
            }
            touched += 1;
        }
        touched
    }

    /// Find the highest-priority entry matching `headers`, recording a hit
    /// on it for stats and idle-timeout purposes.
    pub fn lookup(&self, in_port: u32, headers: &Headers, state: &ClassifierState, bytes: u64) -> Option<FlowEntryId> {
        let entries = self.entries.read().unwrap();
        for entry in entries.iter() {
            if entry.table_match.matches(in_port, headers, state) {
                entry.record_hit(bytes);
                return Some(entry.id);
            }
        }
        None
    }

    /// Like [`Self::lookup`], but returns a clone of the matched entry's
    /// instruction list rather than just its id, for the dispatcher to
    /// execute. Does not record a second hit; callers that need both the id
    /// and the instructions should call this instead of calling both.
    #[must_use]
    pub fn instructions_for(&self, in_port: u32, headers: &Headers, state: &ClassifierState) -> Option<Vec<Instruction>> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .find(|entry| entry.table_match.matches(in_port, headers, state))
            .map(|entry| entry.instructions.clone())
    }

    pub fn remove_by_cookie(&self, cookie: u64) -> Result<(), FlowTableError> {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|e| e.cookie != cookie);
        if entries.len() == before {
            return Err(FlowTableError::CookieNotFound(cookie));
        }
        Ok(())
    }

    /// Remove every entry whose idle or hard timeout has elapsed,
    /// returning their cookies for the controller flow-removed
    /// notification path.
    pub fn reap_expired(&self) -> Vec<u64> {
        let mut entries = self.entries.write().unwrap();
        let mut expired = Vec::new();
        entries.retain(|e| {
            if e.is_expired() {
                expired.push(e.cookie);
                false
            } else {
                true
            }
        });
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent point-in-time snapshot of every entry's identity and
    /// counters, for `get_flow_stats`/`get_aggregate_stats` (§4.7). Taken
    /// under a single read-lock hold so no entry's counters are read mid
    /// concurrent install/delete.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FlowEntrySnapshot> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(FlowEntrySnapshot::of)
            .collect()
    }
}

/// A read-only copy of one flow entry's stats-relevant fields, decoupled
/// from the live `FlowEntry` so callers can hold it past the table's lock.
#[derive(Debug, Clone)]
pub struct FlowEntrySnapshot {
    pub id: FlowEntryId,
    pub priority: u16,
    pub cookie: u64,
    pub table_match: Match,
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration: Duration,
}

impl FlowEntrySnapshot {
    fn of(entry: &FlowEntry) -> Self {
        FlowEntrySnapshot {
            id: entry.id,
            priority: entry.priority,
            cookie: entry.cookie,
            table_match: entry.table_match.clone(),
            packet_count: entry.packet_count(),
            byte_count: entry.byte_count(),
            duration: entry.duration(),
        }
    }
}
