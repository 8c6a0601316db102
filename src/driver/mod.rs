//! Build cycle driver
//!
//! Owns one compiler handle for the lifetime of the process and runs the
//! full pipeline for each cycle:
//!
//! compile → snapshot → diff → materialize → project → prune → record
//!
//! The previous snapshot is replaced only when every step succeeded, so a
//! failed cycle never changes what the next cycle diffs against.

use crate::artifact::{changed_paths, normalize_path, removed_paths, Snapshot};
use crate::capture::MemoryOutput;
use crate::compiler::{
    aggregate_errors, CompileStats, Compiler, CompilerCache, CompilerFactory, CompilerSetup,
    Diagnostic,
};
use crate::config::{BuildConfig, CompilerOptions, StatsLevel};
use crate::error::{OutsyncError, OutsyncResult};
use crate::store::{BuildRecord, CacheStore, LinkMode, OutputProjector, ProjectReport};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where compiler options come from
pub enum ConfigSource {
    /// Options known up front
    Ready(CompilerOptions),
    /// Options produced on first use, e.g. by evaluating a project file
    Deferred(Box<dyn Fn() -> OutsyncResult<CompilerOptions> + Send + Sync>),
}

impl ConfigSource {
    pub fn deferred(
        resolve: impl Fn() -> OutsyncResult<CompilerOptions> + Send + Sync + 'static,
    ) -> Self {
        Self::Deferred(Box::new(resolve))
    }

    fn resolve(&self) -> OutsyncResult<CompilerOptions> {
        match self {
            Self::Ready(options) => Ok(options.clone()),
            Self::Deferred(resolve) => resolve(),
        }
    }
}

impl From<CompilerOptions> for ConfigSource {
    fn from(options: CompilerOptions) -> Self {
        Self::Ready(options)
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(options) => f.debug_tuple("Ready").field(options).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Driver settings, taken from `[build]`
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Build record location; `None` disables the record
    pub record: Option<PathBuf>,
    pub log_stats: StatsLevel,
    pub prevent_symlink_resolution: bool,
    pub link_mode: LinkMode,
    pub prune_stale: bool,
    pub exclude: Vec<String>,
}

impl DriverSettings {
    /// Defaults for the given cache and output directories, without a record
    pub fn new(cache_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let defaults = BuildConfig::default();
        Self {
            cache_dir: cache_dir.into(),
            output_dir: output_dir.into(),
            record: None,
            log_stats: defaults.log_stats,
            prevent_symlink_resolution: defaults.prevent_symlink_resolution,
            link_mode: defaults.link_mode,
            prune_stale: defaults.prune_stale,
            exclude: defaults.exclude,
        }
    }

    pub fn from_config(build: &BuildConfig) -> Self {
        Self {
            cache_dir: build.cache_dir.clone(),
            output_dir: build.output_dir.clone(),
            record: Some(build.record.clone()),
            log_stats: build.log_stats,
            prevent_symlink_resolution: build.prevent_symlink_resolution,
            link_mode: build.link_mode,
            prune_stale: build.prune_stale,
            exclude: build.exclude.clone(),
        }
    }
}

/// Outcome of one successful cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Full artifact set of this cycle
    pub snapshot: Arc<Snapshot>,
    /// Compiler warnings; never fatal
    pub warnings: Vec<Diagnostic>,
    /// Paths the differ reported as new or modified
    pub changed: BTreeSet<String>,
    /// Files written to the cache store
    pub written: usize,
    pub projected: ProjectReport,
    /// Stale output entries removed
    pub pruned: usize,
    pub elapsed: Duration,
}

/// Runs build cycles against a single input directory
pub struct BuildDriver {
    input: PathBuf,
    settings: DriverSettings,
    source: ConfigSource,
    factory: Box<dyn CompilerFactory>,
    compiler: Option<Box<dyn Compiler>>,
    output: MemoryOutput,
    compiler_cache: CompilerCache,
    store: CacheStore,
    projector: OutputProjector,
    previous: Option<Arc<Snapshot>>,
    cycles: u64,
}

impl BuildDriver {
    /// Create a driver for exactly one input directory.
    ///
    /// Nothing is compiled and the compiler is not created until the first
    /// [`build`](Self::build) or [`initialize`](Self::initialize).
    pub fn new(
        inputs: Vec<PathBuf>,
        settings: DriverSettings,
        source: impl Into<ConfigSource>,
        factory: impl CompilerFactory + 'static,
    ) -> OutsyncResult<Self> {
        let [input]: [PathBuf; 1] = inputs
            .try_into()
            .map_err(|inputs: Vec<PathBuf>| OutsyncError::InputCount(inputs.len()))?;

        let store = CacheStore::new(&settings.cache_dir);
        let projector =
            OutputProjector::new(&settings.cache_dir, &settings.output_dir, settings.link_mode)?;

        Ok(Self {
            input,
            settings,
            source: source.into(),
            factory: Box::new(factory),
            compiler: None,
            output: MemoryOutput::new(),
            compiler_cache: CompilerCache::new(),
            store,
            projector,
            previous: None,
            cycles: 0,
        })
    }

    /// Resolve compiler options and create the compiler.
    ///
    /// Runs once; later calls are no-ops. Reserved options are rejected
    /// before the factory is asked for a compiler.
    pub fn initialize(&mut self) -> OutsyncResult<()> {
        if self.compiler.is_some() {
            return Ok(());
        }

        let options = self.source.resolve()?;
        options.ensure_unreserved()?;

        let context = std::path::absolute(&self.input).map_err(|e| {
            OutsyncError::io(format!("resolving input {}", self.input.display()), e)
        })?;

        let setup = CompilerSetup {
            resolve_roots: vec![context.clone()],
            context,
            output: self.output.clone(),
            cache: self.compiler_cache.clone(),
            preserve_symlinks: self.settings.prevent_symlink_resolution,
            options: Arc::new(options),
        };

        let compiler = self.factory.create(setup)?;
        debug!("Initialized compiler {} for {}", compiler.name(), self.input.display());
        self.compiler = Some(compiler);
        Ok(())
    }

    /// Run one build cycle, initializing the compiler on first use
    pub async fn build(&mut self) -> OutsyncResult<CycleReport> {
        self.initialize()?;
        self.run_cycle().await
    }

    async fn run_cycle(&mut self) -> OutsyncResult<CycleReport> {
        let started = Instant::now();
        let cycle = self.cycles + 1;

        let compiler = self
            .compiler
            .as_mut()
            .ok_or_else(|| OutsyncError::Internal("compiler not initialized".to_string()))?;

        debug!("Cycle {}: running {}", cycle, compiler.name());
        let stats = match compiler.run().await {
            Ok(stats) => stats,
            Err(hard) => {
                let detail = hard.detail.clone();
                let err = OutsyncError::from(hard);
                match detail {
                    Some(detail) => error!("{}\n{}", err, detail),
                    None => error!("{}", err),
                }
                return Err(err);
            }
        };

        self.report_stats(&stats);
        if stats.has_errors() {
            return Err(aggregate_errors(&stats.errors));
        }

        let current = Arc::new(self.output.snapshot(&self.settings.exclude)?);
        let previous = self.previous.as_deref();

        let changed = changed_paths(previous, &current);
        let written = self.store.materialize(&current, &changed)?;
        let projected = self.projector.project(&current)?;

        let pruned = if self.settings.prune_stale {
            let removed = match previous {
                Some(previous) => removed_paths(Some(previous), &current),
                None => self.recorded_leftovers(&current),
            };
            self.projector.prune(&removed)?
        } else {
            0
        };

        if let Some(path) = &self.settings.record {
            BuildRecord::from_snapshot(&current, cycle).save(path)?;
        }

        self.previous = Some(Arc::clone(&current));
        self.cycles = cycle;

        let elapsed = started.elapsed();
        info!(
            "Cycle {} finished: {} artifacts, {} changed, {} written, {} pruned in {}ms",
            cycle,
            current.len(),
            changed.len(),
            written,
            pruned,
            elapsed.as_millis()
        );

        Ok(CycleReport {
            cycle,
            snapshot: current,
            warnings: stats.warnings,
            changed,
            written,
            projected,
            pruned,
            elapsed,
        })
    }

    /// Artifacts recorded by an earlier process that the current snapshot
    /// no longer has
    fn recorded_leftovers(&self, current: &Snapshot) -> BTreeSet<String> {
        let Some(path) = &self.settings.record else {
            return BTreeSet::new();
        };

        match BuildRecord::load(path) {
            Ok(Some(record)) => record
                .artifacts
                .into_keys()
                .filter_map(|artifact| match normalize_path(&artifact) {
                    Ok(normalized) => Some(normalized),
                    Err(e) => {
                        warn!("Ignoring build record entry {}: {}", artifact, e);
                        None
                    }
                })
                .filter(|artifact| !current.contains(artifact))
                .collect(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!("Ignoring unreadable build record {}: {}", path.display(), e);
                BTreeSet::new()
            }
        }
    }

    fn report_stats(&self, stats: &CompileStats) {
        for diagnostic in &stats.errors {
            error!("{}", diagnostic);
        }
        for diagnostic in &stats.warnings {
            warn!("{}", diagnostic);
        }
        if let Some(summary) = stats.render(self.settings.log_stats) {
            info!("{}", summary);
        }
    }

    /// Snapshot of the last successful cycle
    pub fn previous_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.previous.as_ref()
    }

    /// Handle to the capture the compiler writes into
    pub fn output(&self) -> &MemoryOutput {
        &self.output
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.compiler.is_some()
    }

    /// Number of successful cycles so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
