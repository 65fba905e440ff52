// SPDX-License-Identifier: Apache-2.0

//! The OpenFlow multi-table dispatcher: walks a packet through a
//! [`dispatcher::PipelineTables`] array, starting at table 0, executing
//! each matched entry's instructions in their fixed order until a terminal
//! action or a table-miss is reached (§4.5 "Pipeline dispatcher").

pub mod dispatcher;

pub use dispatcher::{dispatch, DispatchError, DispatchOutcome, MissBehavior, PipelineTables, PipelineTablesError};
