// SPDX-License-Identifier: Apache-2.0

//! CLI surface (§1b): a thin `clap` front end. Parsing of controller-channel
//! flags and of the config file's own format are both non-goals; this only
//! resolves the config path, per-tag log overrides, and `--dry-run`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "xdpd", about = "OpenFlow user-space datapath")]
pub struct Cli {
    /// Path to the (externally parsed) datapath configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Per-tag log level override, repeatable: `--trace pipeline=debug`.
    #[arg(long = "trace", value_name = "TAG=LEVEL")]
    pub trace: Vec<String>,

    /// Construct and validate the runtime without starting worker threads.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceOverrideError {
    #[error("trace override {0:?} is not of the form TAG=LEVEL")]
    Malformed(String),
    #[error("unrecognized log level {0:?} in trace override")]
    UnknownLevel(String),
}

/// Split one `--trace` argument into its tag and level, rejecting anything
/// that isn't `TAG=LEVEL` with a level `tracing` recognizes.
pub fn parse_trace_override(raw: &str) -> Result<(String, tracing::Level), TraceOverrideError> {
    let (tag, level) = raw.split_once('=').ok_or_else(|| TraceOverrideError::Malformed(raw.to_string()))?;
    if tag.is_empty() || level.is_empty() {
        return Err(TraceOverrideError::Malformed(raw.to_string()));
    }
    let level = level
        .parse::<tracing::Level>()
        .map_err(|_| TraceOverrideError::UnknownLevel(level.to_string()))?;
    Ok((tag.to_string(), level))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_tag_and_level() {
        let (tag, level) = parse_trace_override("pipeline=debug").unwrap();
        assert_eq!(tag, "pipeline");
        assert_eq!(level, tracing::Level::DEBUG);
    }

    #[test]
    fn rejects_missing_equals() {
        assert_eq!(
            parse_trace_override("pipeline").unwrap_err(),
            TraceOverrideError::Malformed("pipeline".to_string())
        );
    }

    #[test]
    fn rejects_unknown_level() {
        assert_eq!(
            parse_trace_override("pipeline=loud").unwrap_err(),
            TraceOverrideError::UnknownLevel("loud".to_string())
        );
    }
}
