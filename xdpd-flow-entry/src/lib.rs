// SPDX-License-Identifier: Apache-2.0

//! The flow/group entry data model and per-table storage (§3 "Flow entry",
//! "Group entry"; §4.7 "Flow/group/table admin").

pub mod action;
pub mod group;
pub mod instruction;
pub mod matching;
pub mod table;

pub use action::Action;
pub use group::{Bucket, GroupEntry, GroupEntryError, GroupId, GroupTable, GroupTableError, GroupType};
pub use instruction::Instruction;
pub use matching::{FieldMatch, Match};
pub use table::{FlowEntry, FlowEntrySnapshot, FlowTable, FlowTableError, TableId};

use xdpd_id::Id;

/// Tag type for [`Id<FlowEntryTag>`], the internal bookkeeping identity of
/// one installed flow entry (for stats lookups), distinct from its
/// controller-visible `cookie`.
pub enum FlowEntryTag {}
pub type FlowEntryId = Id<FlowEntryTag>;
