// SPDX-License-Identifier: Apache-2.0

//! Runtime-adjustable tracing targets for the datapath.
//!
//! Every module that wants its own log verbosity declares a target with
//! [`trace_target!`]; the targets are collected into a link-time registry so
//! that [`TracingControl`] can discover and reconfigure them without each
//! crate needing to register itself explicitly.

pub mod control;
pub mod display;
pub mod targets;

pub use control::{TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;
