//! Build command - run one cycle

use super::{cycle_summary, driver_for};
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::OutsyncResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    let mut driver = driver_for(&args.overrides, config)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Building {}", driver.input().display()));

    let report = match driver.build().await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Build failed");
            return Err(e);
        }
    };

    spinner.stop(&cycle_summary(&report));
    if !report.warnings.is_empty() {
        ui::step_warn(
            &ctx,
            &format!("{} compiler warning(s), run with -v for details", report.warnings.len()),
        );
    }

    Ok(())
}
