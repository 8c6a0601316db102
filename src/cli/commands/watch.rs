//! Watch command - run cycles until interrupted
//!
//! Compiler failures are reported and the loop carries on; the next cycle
//! diffs against the last good snapshot. Anything else stops the loop.

use super::{cycle_summary, driver_for};
use crate::cli::args::WatchArgs;
use crate::config::Config;
use crate::error::OutsyncResult;
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Execute the watch command
pub async fn execute(args: WatchArgs, config: &Config) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    let mut driver = driver_for(&args.overrides, config)?;

    // Configuration problems fail before the first cycle
    driver.initialize()?;

    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            // notify_one keeps a permit, so a signal during a cycle is seen afterwards
            notify.notify_one();
        }
    });

    let interval = Duration::from_millis(args.interval_ms);
    let mut attempted = 0u64;
    let mut failed = 0u64;

    loop {
        attempted += 1;
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start(&format!("Cycle {}", attempted));

        match driver.build().await {
            Ok(report) => spinner.stop(&cycle_summary(&report)),
            Err(e) if e.is_compiler_error() => {
                failed += 1;
                spinner.stop_error(&e.to_string());
            }
            Err(e) => {
                spinner.stop_error("Cycle failed");
                return Err(e);
            }
        }

        if args.cycles != 0 && attempted >= args.cycles {
            debug!("Reached cycle limit of {}", args.cycles);
            break;
        }

        tokio::select! {
            _ = interrupted.notified() => {
                info!("Interrupted, stopping after cycle {}", attempted);
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    let message = format!(
        "{} cycle(s), {} failed, {} artifacts in last good build",
        attempted,
        failed,
        driver.previous_snapshot().map_or(0, |snapshot| snapshot.len())
    );
    if failed == 0 {
        ui::step_ok(&ctx, &message);
    } else {
        ui::step_warn(&ctx, &message);
    }

    Ok(())
}
