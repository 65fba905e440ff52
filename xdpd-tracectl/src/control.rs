// SPDX-License-Identifier: Apache-2.0

//! Tracing runtime control: a global registry of per-target levels that can
//! be reloaded without restarting the process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};

use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &["tracectl"]);

#[derive(Debug)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

impl TargetCfg {
    pub const fn new(
        target: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            level,
            tags,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) level: LevelFilter,
    pub(crate) targets: HashMap<&'static str, TargetCfg>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        Self {
            level,
            targets: HashMap::new(),
        }
    }

    fn register(&mut self, target: &'static str, level: LevelFilter, tags: &'static [&'static str]) {
        debug!("registering target {target} level={level} tags={tags:?}");
        let unit = TargetCfg::new(target, level, tags);
        if let Some(exist) = self.targets.insert(target, unit) {
            warn!("target {} has been multiply defined", exist.target);
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut f = EnvFilter::new(self.level.to_string());
        for unit in self.targets.values() {
            let directive = format!("{}={}", unit.target, unit.level);
            if let Ok(d) = directive.parse() {
                f = f.add_directive(d);
            }
        }
        f
    }
}

/// Handle used to read and adjust log verbosity while the process runs.
#[derive(Debug)]
pub struct TracingControl {
    db: Arc<Mutex<TargetCfgDb>>,
    reload_handle: Arc<reload::Handle<EnvFilter, Registry>>,
}

impl TracingControl {
    fn new() -> Self {
        let mut db = TargetCfgDb::new(LevelFilter::INFO);
        for t in crate::targets::TRACING_TARGETS {
            db.register(t.target, t.level, t.tags);
        }

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_level(true);

        let (filter, reload_handle) = reload::Layer::new(db.env_filter());

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            // another TracingControl (e.g. in a sibling test binary) already
            // installed a subscriber; proceed with whatever is active.
        }

        info!("initialized tracing control, default level is {}", db.level);
        Self {
            db: Arc::new(Mutex::new(db)),
            reload_handle: Arc::new(reload_handle),
        }
    }

    fn reload(&self, filter: EnvFilter) {
        let _ = self.reload_handle.reload(filter);
    }

    pub fn init() {
        get_trace_ctl();
    }

    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) {
        let mut changed = false;
        let mut db = self.db.lock().unwrap();
        for unit in db.targets.values_mut() {
            if unit.tags.contains(&tag) && unit.level != level {
                changed = true;
                unit.level = level;
            }
        }
        if changed {
            info!("set log level for tag {tag} to {level}");
            self.reload(db.env_filter());
        }
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db.lock().unwrap();
        if db.level != level {
            db.level = level;
            info!("set default log level to {level}");
            self.reload(db.env_filter());
        }
    }

    pub fn get_default_level(&self) -> LevelFilter {
        self.db.lock().unwrap().level
    }

    pub fn register(&self, target: &'static str, level: LevelFilter, tags: &'static [&'static str]) {
        let mut db = self.db.lock().unwrap();
        db.register(target, level, tags);
        self.reload(db.env_filter());
    }

    pub fn get_tags(&self) -> impl Iterator<Item = &'static str> + use<> {
        let mut set = HashSet::new();
        for target in crate::targets::TRACING_TARGETS {
            for tag in target.tags {
                set.insert(*tag);
            }
        }
        set.into_iter()
    }

    pub fn dump(&self) {
        let db = self.db.lock().unwrap();
        info!("{db}");
    }
}

static INIT: Once = Once::new();
static mut TRACING_CTL: Option<TracingControl> = None;

/// Get the process-wide [`TracingControl`], initializing the global
/// subscriber on first call.
pub fn get_trace_ctl() -> &'static TracingControl {
    INIT.call_once(|| unsafe {
        TRACING_CTL = Some(TracingControl::new());
    });
    #[allow(static_mut_refs)]
    unsafe {
        TRACING_CTL.as_ref().unwrap()
    }
}
