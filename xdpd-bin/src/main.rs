// SPDX-License-Identifier: Apache-2.0

//! The `xdpd` binary: parse the CLI (§1b), load and validate the
//! `DatapathConfig` (§1a), stand up structured logging (§1c), and construct
//! (and, unless `--dry-run`, run) the [`Runtime`](xdpd_dataplane::runtime::Runtime).

mod cli;
mod config;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use xdpd_dataplane::runtime::{Runtime, RuntimeConfig};
use xdpd_net::buffer::NewBufferPool;
use xdpd_pktmem::Pool as PktPool;
use xdpd_tracectl::TracingControl;

use cli::Cli;
use config::DatapathConfig;

fn load_config(path: &std::path::Path) -> Result<DatapathConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    let config: DatapathConfig = serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
    config.validate().with_context(|| "validating datapath configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    TracingControl::init();
    let trace_ctl = xdpd_tracectl::get_trace_ctl();
    for raw in &cli.trace {
        let (tag, level) = cli::parse_trace_override(raw).with_context(|| format!("parsing --trace {raw:?}"))?;
        trace_ctl.set_tag_level(&tag, level.into());
    }

    let datapath_config = load_config(&cli.config)?;

    let numa_nodes = vec![None; datapath_config.core_count()];
    let pool = PktPool::new_pool(datapath_config.bufferpool)?;
    let meter: xdpd_dataplane::worker::MeterGate = Arc::new(move |_switch| true);

    let mut runtime = Runtime::new(
        RuntimeConfig {
            numa_nodes,
            strict_numa: datapath_config.workers.strict_numa,
            num_tables: datapath_config.num_tables,
            pirl: datapath_config.pirl,
        },
        pool,
        meter,
    )
    .with_context(|| "constructing runtime from datapath configuration")?;

    for port in &datapath_config.ports {
        match port.kind {
            config::PortKind::VirtualLink => {
                tracing::info!(port = %port.name, "virtual-link ports are attached pairwise by the controller plane, not at startup");
            }
            config::PortKind::KernelRing | config::PortKind::UserDriver => {
                tracing::warn!(port = %port.name, kind = ?port.kind, "port kind not yet wired into this binary's startup path");
            }
        }
    }

    if cli.dry_run {
        tracing::info!("dry run: runtime constructed and validated, not starting worker threads");
        return Ok(());
    }

    runtime.start_cores();
    tracing::info!(dpid = datapath_config.dpid, cores = runtime.scheduler.core_count(), "datapath running");

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .with_context(|| "installing SIGINT handler")?;
    let _ = rx.recv();

    tracing::info!("shutting down");
    runtime.shutdown();
    Ok(())
}
