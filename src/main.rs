//! outsync - incremental build-output cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use outsync::cli::{Cli, Commands};
use outsync::config::{ConfigManager, GeneralConfig};
use outsync::error::{OutsyncError, OutsyncResult};
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, general: &GeneralConfig) {
    let level = match verbose {
        0 if general.verbose => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("outsync={}", level));

    if general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}

async fn run() -> OutsyncResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let cwd = std::env::current_dir()
        .map_err(|e| OutsyncError::io("getting current directory", e))?;

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config.general);
    match local_config_path {
        Some(ref path) => debug!("Found local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => debug!("No local config found"),
    }

    // Relative paths are relative to the project, i.e. the local config's directory
    let base = local_config_path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(cwd.as_path())
        .to_path_buf();
    let config = config.anchored(&base);

    // Dispatch to command
    match cli.command {
        Commands::Build(args) => outsync::cli::commands::build(args, &config).await,
        Commands::Watch(args) => outsync::cli::commands::watch(args, &config).await,
        Commands::Verify(args) => outsync::cli::commands::verify(args, &config).await,
        Commands::Config(args) => {
            outsync::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
