// SPDX-License-Identifier: Apache-2.0

//! `Display` impls for dumping the current tracing configuration.

use crate::control::{TargetCfg, TargetCfgDb};
use std::fmt::Display;

macro_rules! TARGET_FMT {
    () => {
        "{:>25} │ {:>6} │ {}"
    };
}

fn fmt_target_heading(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "{}", format_args!(TARGET_FMT!(), "TARGET", "LEVEL", "TAGS"))
}

impl Display for TargetCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            format_args!(TARGET_FMT!(), self.target, self.level, self.tags.join(","))
        )
    }
}

impl Display for TargetCfgDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "──── tracing configuration ────")?;
        fmt_target_heading(f)?;
        for unit in self.targets.values() {
            writeln!(f, "{unit}")?;
        }
        write!(f, "{}", format_args!(TARGET_FMT!(), "(default)", self.level, "--"))
    }
}
