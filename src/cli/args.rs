//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// outsync - incremental build-output cache
///
/// Runs a compiler, persists only the artifacts that changed and links
/// the full artifact set into an output directory.
#[derive(Parser, Debug)]
#[command(name = "outsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "OUTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local outsync.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single build cycle
    Build(BuildArgs),

    /// Run build cycles repeatedly until interrupted
    Watch(WatchArgs),

    /// Check the output directory against the last build record
    Verify(VerifyArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Options shared by build and watch that override `[build]`
#[derive(Parser, Debug, Default)]
pub struct BuildOverrides {
    /// Input directory (overrides build.input)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory (overrides build.output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cache directory (overrides build.cache_dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Always copy artifacts instead of symlinking
    #[arg(long)]
    pub copy: bool,

    /// Keep output entries for artifacts that disappeared
    #[arg(long)]
    pub no_prune: bool,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub overrides: BuildOverrides,
}

/// Arguments for the watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub overrides: BuildOverrides,

    /// Delay between cycles in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Stop after this many cycles (0 = until interrupted)
    #[arg(long, default_value = "0")]
    pub cycles: u64,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Build record to check (overrides build.record)
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Output directory to check (overrides build.output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., build.output_dir)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local outsync.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_build() {
        let cli = Cli::parse_from(["outsync", "build", "--input", "src", "--copy"]);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.overrides.input, Some(PathBuf::from("src")));
                assert!(args.overrides.copy);
                assert!(!args.overrides.no_prune);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_parses_watch_defaults() {
        let cli = Cli::parse_from(["outsync", "watch"]);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.interval_ms, 1000);
                assert_eq!(args.cycles, 0);
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn cli_parses_config_set_local() {
        let cli = Cli::parse_from(["outsync", "config", "set", "build.input", "app", "--local"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Set { key, value, local }),
            }) => {
                assert_eq!(key, "build.input");
                assert_eq!(value, "app");
                assert!(local);
            }
            _ => panic!("expected Config set command"),
        }
    }

    #[test]
    fn cli_no_local_flag() {
        let cli = Cli::parse_from(["outsync", "--no-local", "verify"]);
        assert!(cli.no_local);
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["outsync", "verify"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["outsync", "-v", "verify"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["outsync", "-vv", "verify"]);
        assert_eq!(cli.verbose, 2);
    }
}
