//! Configuration schema for outsync
//!
//! Configuration is read from `~/.config/outsync/config.toml`, overlaid with
//! a project-local `outsync.toml` when one is found.

use crate::error::{OutsyncError, OutsyncResult};
use crate::store::LinkMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache, output and cycle behavior
    pub build: BuildConfig,

    /// Options handed to the compiler
    pub compiler: CompilerOptions,
}

impl Config {
    /// Resolve relative build paths against `base`
    pub fn anchored(mut self, base: &Path) -> Self {
        let anchor = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        if let Some(input) = self.build.input.as_mut() {
            anchor(input);
        }
        anchor(&mut self.build.cache_dir);
        anchor(&mut self.build.output_dir);
        anchor(&mut self.build.work_dir);
        anchor(&mut self.build.record);
        self
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Build cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Input directory handed to the compiler as its context
    pub input: Option<PathBuf>,

    /// Durable cache of artifact bytes
    pub cache_dir: PathBuf,

    /// Directory the artifacts are projected into
    pub output_dir: PathBuf,

    /// Directory the command compiler writes its output into
    pub work_dir: PathBuf,

    /// Build record written after each successful cycle
    pub record: PathBuf,

    /// How much of the compiler summary to log
    pub log_stats: StatsLevel,

    /// Keep symlinked module paths as-is instead of resolving them
    pub prevent_symlink_resolution: bool,

    /// Symlink artifacts or always copy them
    pub link_mode: LinkMode,

    /// Remove output entries for artifacts that disappeared
    pub prune_stale: bool,

    /// Output paths never included in a snapshot
    pub exclude: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            input: None,
            cache_dir: PathBuf::from(".outsync/cache"),
            output_dir: PathBuf::from("dist"),
            work_dir: PathBuf::from(".outsync/work"),
            record: PathBuf::from(".outsync/build-record.json"),
            log_stats: StatsLevel::default(),
            prevent_symlink_resolution: true,
            link_mode: LinkMode::Auto,
            prune_stale: true,
            exclude: vec!["build-record.json".to_string()],
        }
    }
}

/// Verbosity of the compiler summary surfaced after each cycle.
///
/// Accepts `true`/`false` as well as a level name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "StatsSetting")]
pub enum StatsLevel {
    /// Never log the summary
    None,
    /// Log the summary only for cycles with errors
    #[default]
    ErrorsOnly,
    /// One line per cycle
    Minimal,
    /// Summary plus the artifact list
    Normal,
    /// Everything, including diagnostic details
    Verbose,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsSetting {
    Flag(bool),
    Name(String),
}

impl TryFrom<StatsSetting> for StatsLevel {
    type Error = String;

    fn try_from(setting: StatsSetting) -> Result<Self, Self::Error> {
        match setting {
            StatsSetting::Flag(true) => Ok(Self::Normal),
            StatsSetting::Flag(false) => Ok(Self::None),
            StatsSetting::Name(name) => name.parse(),
        }
    }
}

impl std::str::FromStr for StatsLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "false" => Ok(Self::None),
            "errors-only" => Ok(Self::ErrorsOnly),
            "minimal" => Ok(Self::Minimal),
            "normal" | "true" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            other => Err(format!(
                "unknown stats level '{}', expected none, errors-only, minimal, normal or verbose",
                other
            )),
        }
    }
}

impl fmt::Display for StatsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::ErrorsOnly => "errors-only",
            Self::Minimal => "minimal",
            Self::Normal => "normal",
            Self::Verbose => "verbose",
        };
        write!(f, "{}", name)
    }
}

/// Caller-supplied compiler options.
///
/// `context`, `cache`, `output.path` and `resolve.roots` exist only so that
/// setting them can be rejected: outsync owns those fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Program run once per cycle
    pub program: Option<String>,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Extra environment variables for the program
    pub env: BTreeMap<String, String>,

    /// Compilation context (reserved)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,

    /// Compiler cache object (reserved)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<toml::Value>,

    /// Output settings
    pub output: OutputOptions,

    /// Module resolution settings
    pub resolve: ResolveOptions,

    /// Free-form settings passed through to the compiler
    pub settings: toml::Table,
}

/// Compiler output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Output root (reserved)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Output file name pattern
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Compiler module resolution settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Resolution roots (reserved, anchored at the input directory)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<PathBuf>,

    /// Extensions tried when resolving modules
    pub extensions: Vec<String>,
}

impl CompilerOptions {
    /// Reject any field outsync sets itself
    pub fn ensure_unreserved(&self) -> OutsyncResult<()> {
        let reserved = [
            ("context", self.context.is_some()),
            ("cache", self.cache.is_some()),
            ("output.path", self.output.path.is_some()),
            ("resolve.roots", !self.resolve.roots.is_empty()),
        ];

        match reserved.iter().find(|(_, set)| *set) {
            Some((field, _)) => Err(OutsyncError::ReservedOption { field: *field }),
            None => Ok(()),
        }
    }
}
