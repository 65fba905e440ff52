// SPDX-License-Identifier: Apache-2.0

//! `DatapathConfig` (§1a): the shape the runtime consumes once an external
//! file loader (a non-goal) has already turned some on-disk format into
//! these values. Everything here is validated once, at construction time,
//! turning a bad configuration into a startup-time failure rather than a
//! runtime one.

use xdpd_admin::PirlConfig;
use xdpd_net::buffer::BufferPoolConfig;
use xdpd_tracectl::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum OfVersion {
    V1_0,
    V1_2,
    V1_3,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum WorkerSelection {
    /// Use this many cores, ids assigned 0..count.
    Count(usize),
    /// Pin to these specific OS core ids.
    Explicit(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct WorkerConfig {
    pub selection: WorkerSelection,
    pub max_ports_per_core: usize,
    pub strict_numa: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum PortKind {
    KernelRing,
    VirtualLink,
    UserDriver,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct PortConfig {
    pub name: String,
    pub kind: PortKind,
    pub queue_count: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct LoggingConfig {
    pub default_level: LevelFilterShim,
}

/// [`tracing_subscriber::filter::LevelFilter`] is neither `PartialEq` nor
/// constructible in a `const` context the way this config needs to be
/// compared in tests, so the config layer carries its own small mirror and
/// converts at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum LevelFilterShim {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelFilterShim> for LevelFilter {
    fn from(value: LevelFilterShim) -> Self {
        match value {
            LevelFilterShim::Off => LevelFilter::OFF,
            LevelFilterShim::Error => LevelFilter::ERROR,
            LevelFilterShim::Warn => LevelFilter::WARN,
            LevelFilterShim::Info => LevelFilter::INFO,
            LevelFilterShim::Debug => LevelFilter::DEBUG,
            LevelFilterShim::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatapathConfig {
    pub dpid: u64,
    pub of_version: OfVersion,
    pub num_tables: u8,
    pub workers: WorkerConfig,
    pub ports: Vec<PortConfig>,
    pub bufferpool: BufferPoolConfig,
    pub pirl: PirlConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("num_tables must be in 1..=32, got {0}")]
    NumTablesOutOfRange(u8),
    #[error("worker selection must name at least one core")]
    NoWorkers,
    #[error("max_ports_per_core must be nonzero")]
    ZeroMaxPortsPerCore,
    #[error("duplicate port name {0:?}")]
    DuplicatePortName(String),
    #[error("bufferpool capacity must be nonzero")]
    ZeroBufferpoolCapacity,
}

impl DatapathConfig {
    /// Validate the shape (§1a): non-zero capacities, `num_tables` within
    /// range, no duplicate port names. Never panics on bad input.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_tables == 0 || self.num_tables > 32 {
            return Err(ConfigError::NumTablesOutOfRange(self.num_tables));
        }
        match &self.workers.selection {
            WorkerSelection::Count(n) if *n == 0 => return Err(ConfigError::NoWorkers),
            WorkerSelection::Explicit(ids) if ids.is_empty() => return Err(ConfigError::NoWorkers),
            _ => {}
        }
        if self.workers.max_ports_per_core == 0 {
            return Err(ConfigError::ZeroMaxPortsPerCore);
        }
        if self.bufferpool.capacity == 0 {
            return Err(ConfigError::ZeroBufferpoolCapacity);
        }
        let mut seen = std::collections::HashSet::new();
        for port in &self.ports {
            if !seen.insert(&port.name) {
                return Err(ConfigError::DuplicatePortName(port.name.clone()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn core_count(&self) -> usize {
        match &self.workers.selection {
            WorkerSelection::Count(n) => *n,
            WorkerSelection::Explicit(ids) => ids.len(),
        }
    }
}
