// SPDX-License-Identifier: Apache-2.0

//! The admin-plane error taxonomy (§7): every rejection the controller
//! channel can hand back is a distinct variant here, never a bare `String`.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("table_id {0} is out of range for this pipeline (and is not the ALL_TABLES sentinel)")]
    InvalidTable(u8),
    #[error("flow-mod ADD with CHECK_OVERLAP conflicts with an existing entry at priority {priority}")]
    FlowModOverlap { priority: u16 },
    #[error("no flow entry with cookie {0:#x} found")]
    FlowModNotFound(u64),
    #[error("no flow entry matched the MODIFY request's match template")]
    FlowModModifyNotFound,
    #[error(transparent)]
    Group(#[from] xdpd_flow_entry::GroupTableError),
    #[error("group {0:?} is still referenced by an installed flow entry")]
    GroupReferenced(xdpd_flow_entry::GroupId),
    #[error("buffer_id {0} has expired or was never stored")]
    BufferExpired(u32),
}
