//! Verify command - compare the output tree with the build record

use crate::cli::args::VerifyArgs;
use crate::config::Config;
use crate::error::{OutsyncError, OutsyncResult};
use crate::store::{BuildRecord, Mismatch};
use crate::ui::{self, UiContext};

/// Execute the verify command
pub async fn execute(args: VerifyArgs, config: &Config) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    let record_path = args.record.unwrap_or_else(|| config.build.record.clone());
    let output_dir = args.output.unwrap_or_else(|| config.build.output_dir.clone());

    let record = BuildRecord::load(&record_path)?
        .ok_or_else(|| OutsyncError::RecordNotFound(record_path.clone()))?;

    ui::section(&ctx, "Build record");
    ui::key_value(&ctx, "Build", &record.build_id.to_string());
    ui::key_value(&ctx, "Cycle", &record.cycle.to_string());
    ui::key_value(&ctx, "Finished", &record.finished_at.to_rfc3339());
    ui::key_value(&ctx, "Output", &output_dir.display().to_string());

    let mismatches = record.verify(&output_dir);
    ui::key_value_status(
        &ctx,
        "Artifacts",
        &format!("{} recorded, {} mismatched", record.artifacts.len(), mismatches.len()),
        mismatches.is_empty(),
    );

    if mismatches.is_empty() {
        ui::step_ok(&ctx, "Output matches the build record");
        return Ok(());
    }

    for mismatch in &mismatches {
        match mismatch {
            Mismatch::Missing(path) => ui::step_error_detail(&ctx, "Missing", path),
            Mismatch::Modified(path) => ui::step_error_detail(&ctx, "Modified", path),
        }
    }

    Err(OutsyncError::OutputMismatch(mismatches.len()))
}
