//! CLI command implementations

pub mod build;
pub mod config;
pub mod verify;
pub mod watch;

pub use build::execute as build;
pub use config::execute as config;
pub use verify::execute as verify;
pub use watch::execute as watch;

use crate::cli::args::BuildOverrides;
use crate::compiler::CommandCompilerFactory;
use crate::config::Config;
use crate::driver::{BuildDriver, CycleReport, DriverSettings};
use crate::error::OutsyncResult;
use crate::store::LinkMode;
use tracing::debug;

/// Create a driver from configuration with command-line overrides applied
fn driver_for(overrides: &BuildOverrides, config: &Config) -> OutsyncResult<BuildDriver> {
    let mut build = config.build.clone();

    if let Some(input) = &overrides.input {
        build.input = Some(input.clone());
    }
    if let Some(output) = &overrides.output {
        build.output_dir = output.clone();
    }
    if let Some(cache_dir) = &overrides.cache_dir {
        build.cache_dir = cache_dir.clone();
    }
    if overrides.copy {
        build.link_mode = LinkMode::Copy;
    }
    if overrides.no_prune {
        build.prune_stale = false;
    }

    debug!(
        "Driver: input={:?} cache={} output={} mode={}",
        build.input,
        build.cache_dir.display(),
        build.output_dir.display(),
        build.link_mode
    );

    BuildDriver::new(
        build.input.clone().into_iter().collect(),
        DriverSettings::from_config(&build),
        config.compiler.clone(),
        CommandCompilerFactory::new(&build.work_dir),
    )
}

/// One-line summary of a successful cycle
fn cycle_summary(report: &CycleReport) -> String {
    let mut summary = format!(
        "{} artifacts, {} changed, {} written",
        report.snapshot.len(),
        report.changed.len(),
        report.written
    );
    if report.projected.copied > 0 {
        summary.push_str(&format!(", {} copied", report.projected.copied));
    }
    if report.pruned > 0 {
        summary.push_str(&format!(", {} pruned", report.pruned));
    }
    summary.push_str(&format!(" in {}ms", report.elapsed.as_millis()));
    summary
}
