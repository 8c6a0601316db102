//! External program compiler
//!
//! Runs a configured program once per cycle. The program writes its output
//! into a persistent work directory (so its own incremental state survives
//! between cycles), which is then ingested into the in-memory capture.
//!
//! The program sees:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `OUTSYNC_CONTEXT` | Input directory (also its working directory) |
//! | `OUTSYNC_OUTPUT_DIR` | Work directory to write artifacts into |
//! | `OUTSYNC_RESOLVE_ROOTS` | Module resolution roots, path-list separated |
//! | `OUTSYNC_SETTINGS` | `[compiler.settings]` as JSON |
//! | `OUTSYNC_OUTPUT_FILENAME` | `compiler.output.filename`, when set |
//! | `OUTSYNC_RESOLVE_EXTENSIONS` | `compiler.resolve.extensions`, comma separated, when set |
//! | `NODE_PRESERVE_SYMLINKS` | `1` unless symlink resolution is allowed |

use crate::artifact::normalize_path;
use crate::compiler::backend::{Compiler, CompilerFactory};
use crate::compiler::setup::CompilerSetup;
use crate::compiler::stats::{CompileStats, Diagnostic, HardError};
use crate::compiler::{error_output_tail, stream_child_output};
use crate::error::{OutsyncError, OutsyncResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Instant, UNIX_EPOCH};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, trace};

/// Creates [`CommandCompiler`]s writing into a fixed work directory
pub struct CommandCompilerFactory {
    work_dir: PathBuf,
}

impl CommandCompilerFactory {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

impl CompilerFactory for CommandCompilerFactory {
    fn create(&self, setup: CompilerSetup) -> OutsyncResult<Box<dyn Compiler>> {
        let program = setup
            .options
            .program
            .clone()
            .ok_or_else(|| OutsyncError::InvalidConfigValue {
                key: "compiler.program".to_string(),
                reason: "no program configured".to_string(),
            })?;

        // The child runs inside the context directory
        let work_dir = std::path::absolute(&self.work_dir).map_err(|e| {
            OutsyncError::io(format!("resolving work directory {}", self.work_dir.display()), e)
        })?;

        Ok(Box::new(CommandCompiler {
            program,
            work_dir,
            setup,
        }))
    }
}

/// Compiler backed by an external program
pub struct CommandCompiler {
    program: String,
    work_dir: PathBuf,
    setup: CompilerSetup,
}

/// Counts from one ingestion of the work directory
#[derive(Debug, Default)]
struct Ingested {
    read: usize,
    kept: usize,
    removed: usize,
}

impl CommandCompiler {
    fn command(&self) -> Result<Command, HardError> {
        let options = &self.setup.options;

        let roots = std::env::join_paths(&self.setup.resolve_roots)
            .map_err(|e| HardError::new("invalid resolution root").with_detail(e.to_string()))?;
        let settings = serde_json::to_string(&options.settings)
            .map_err(|e| HardError::new("invalid compiler settings").with_detail(e.to_string()))?;

        let mut command = Command::new(&self.program);
        command
            .args(&options.args)
            .current_dir(&self.setup.context)
            .envs(&options.env)
            .env("OUTSYNC_CONTEXT", &self.setup.context)
            .env("OUTSYNC_OUTPUT_DIR", &self.work_dir)
            .env("OUTSYNC_RESOLVE_ROOTS", roots)
            .env("OUTSYNC_SETTINGS", settings)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(filename) = &options.output.filename {
            command.env("OUTSYNC_OUTPUT_FILENAME", filename);
        }
        if !options.resolve.extensions.is_empty() {
            command.env("OUTSYNC_RESOLVE_EXTENSIONS", options.resolve.extensions.join(","));
        }
        if self.setup.preserve_symlinks {
            command.env("NODE_PRESERVE_SYMLINKS", "1");
        }

        Ok(command)
    }

    /// Mirror the work directory into the capture.
    ///
    /// Files whose size and modification time match the compiler cache are
    /// not re-read. Files that disappeared from the work directory are
    /// removed from the capture.
    async fn ingest(&self) -> io::Result<Ingested> {
        let output = &self.setup.output;
        let cache = &self.setup.cache;
        let mut ingested = Ingested::default();
        let mut seen = HashSet::new();
        let mut pending = vec![self.work_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = fs::metadata(&path).await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(artifact) = relative_artifact(&self.work_dir, &path) else {
                    trace!("Skipping unrepresentable path {}", path.display());
                    continue;
                };

                let fingerprint = fingerprint(&meta);
                let fresh = fingerprint
                    .as_deref()
                    .is_some_and(|f| cache.holds(&artifact, f.as_bytes()))
                    && output.is_file(&artifact);

                if fresh {
                    ingested.kept += 1;
                } else {
                    let contents = fs::read(&path).await?;
                    output.write(&artifact, &contents)?;
                    match fingerprint {
                        Some(f) => cache.insert(artifact.clone(), f),
                        None => {
                            cache.remove(&artifact);
                        }
                    }
                    ingested.read += 1;
                }
                seen.insert(artifact);
            }
        }

        for stale in output.file_paths() {
            if !seen.contains(&stale) {
                output.remove_file(&stale)?;
                cache.remove(&stale);
                ingested.removed += 1;
            }
        }

        Ok(ingested)
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn run(&mut self) -> Result<CompileStats, HardError> {
        let started = Instant::now();
        let context = &self.setup.context;

        let is_dir = fs::metadata(context).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Err(HardError::new("input directory not found")
                .with_module(context.display().to_string()));
        }

        fs::create_dir_all(&self.work_dir).await.map_err(|e| {
            HardError::new(format!("cannot create work directory {}", self.work_dir.display()))
                .with_detail(e.to_string())
        })?;

        let mut command = self.command()?;
        debug!("Executing: {} {:?}", self.program, self.setup.options.args);

        let mut child = command.spawn().map_err(|e| {
            HardError::new(format!("failed to start {}", self.program)).with_detail(e.to_string())
        })?;

        let program = self.program.as_str();
        let log_line = |line: &str| debug!("[{}] {}", program, line);
        let lines = stream_child_output(&mut child, &log_line).await;

        let status = child.wait().await.map_err(|e| {
            HardError::new(format!("failed waiting for {}", program)).with_detail(e.to_string())
        })?;

        let Some(code) = status.code() else {
            return Err(HardError::new(format!("{} was terminated by a signal", program))
                .with_detail(error_output_tail(&lines)));
        };

        let (mut errors, warnings) = classify_output(&lines);
        if code != 0 && errors.is_empty() {
            errors.push(
                Diagnostic::new(format!("{} exited with code {}", program, code))
                    .with_detail(error_output_tail(&lines)),
            );
        }

        let ingested = self.ingest().await.map_err(|e| {
            HardError::new("failed to collect compiler output")
                .with_module(self.work_dir.display().to_string())
                .with_detail(e.to_string())
        })?;
        debug!(
            "Ingested work directory: {} read, {} unchanged, {} removed",
            ingested.read, ingested.kept, ingested.removed
        );

        Ok(CompileStats {
            errors,
            warnings,
            assets: self.setup.output.file_paths(),
            elapsed: started.elapsed(),
            output: Some(lines.join("\n")).filter(|output| !output.is_empty()),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
}

const LABELS: [(&str, Severity); 2] = [("error", Severity::Error), ("warning", Severity::Warning)];

/// Split program output into error and warning diagnostics.
///
/// Recognizes lines that start with `error`/`warning` (any case, e.g.
/// `ERROR in ./src/a.js`) and `<location>: error <message>` lines.
fn classify_output(lines: &[String]) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for line in lines {
        if let Some((severity, diagnostic)) = classify_line(line) {
            match severity {
                Severity::Error => errors.push(diagnostic),
                Severity::Warning => warnings.push(diagnostic),
            }
        }
    }

    (errors, warnings)
}

fn classify_line(line: &str) -> Option<(Severity, Diagnostic)> {
    let trimmed = line.trim();
    let separator = |c: char| c == ':' || c.is_whitespace();

    for (label, severity) in LABELS {
        let head = trimmed.get(..label.len());
        let rest = trimmed.get(label.len()..).unwrap_or_default();
        if head.is_some_and(|h| h.eq_ignore_ascii_case(label))
            && rest.starts_with(|c: char| separator(c) || c == '[')
        {
            let message = rest.trim_start_matches(separator);
            let message = if message.is_empty() { trimmed } else { message };
            return Some((severity, Diagnostic::new(message)));
        }

        if let Some((location, message)) = trimmed.split_once(&format!(": {}", label)) {
            if !location.is_empty() && message.starts_with(separator) {
                let message = message.trim_start_matches(separator);
                return Some((severity, Diagnostic::new(message).with_module(location)));
            }
        }
    }

    None
}

fn relative_artifact(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    normalize_path(&segments.join("/")).ok()
}

fn fingerprint(meta: &std::fs::Metadata) -> Option<String> {
    let modified = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("{}:{}", meta.len(), modified.as_nanos()))
}
