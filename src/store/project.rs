//! Output tree projection
//!
//! Every artifact of the current snapshot is made visible under the output
//! root as a symlink into the cache store. Filesystems that refuse symlinks
//! get a byte copy instead; readers see the same content either way.

use super::{ancestors_are_dirs, clear_file_ancestors};
use crate::artifact::{artifact_location, normalize_path, Snapshot};
use crate::error::{OutsyncError, OutsyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// How artifacts are placed into the output tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Symlink into the cache, copying when symlinks are unavailable
    #[default]
    Auto,
    /// Always copy bytes out of the cache
    Copy,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// Counts from one projection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectReport {
    /// Symlinks created
    pub linked: usize,
    /// Files copied because symlinks were unavailable or disabled
    pub copied: usize,
    /// Entries that already pointed at (or held) the right content
    pub unchanged: usize,
}

impl ProjectReport {
    pub fn total(&self) -> usize {
        self.linked + self.copied + self.unchanged
    }
}

/// Symlink state carried across one projection pass
struct LinkPass {
    /// Still trying symlinks; cleared on the first refusal
    symlinks: bool,
    /// Cached probe result
    capable: Option<bool>,
}

/// What happened to a single output entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Linked,
    Copied,
    Unchanged,
}

type Symlinker = fn(&Path, &Path) -> io::Result<()>;

/// Reconciles an output directory against a snapshot
#[derive(Clone)]
pub struct OutputProjector {
    cache_root: PathBuf,
    output_root: PathBuf,
    mode: LinkMode,
    symlink: Symlinker,
}

impl fmt::Debug for OutputProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputProjector")
            .field("cache_root", &self.cache_root)
            .field("output_root", &self.output_root)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl OutputProjector {
    /// Create a projector linking `output_root` entries into `cache_root`.
    ///
    /// The cache root is made absolute so link targets resolve regardless
    /// of where the output tree is read from.
    pub fn new(
        cache_root: &Path,
        output_root: impl Into<PathBuf>,
        mode: LinkMode,
    ) -> OutsyncResult<Self> {
        let cache_root = std::path::absolute(cache_root).map_err(|e| {
            OutsyncError::io(format!("resolving cache root {}", cache_root.display()), e)
        })?;

        Ok(Self {
            cache_root,
            output_root: output_root.into(),
            mode,
            symlink: symlink_file,
        })
    }

    #[cfg(test)]
    fn with_symlinker(mut self, symlink: Symlinker) -> Self {
        self.symlink = symlink;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Place every artifact of `current` into the output tree.
    ///
    /// Runs for all artifacts, not just changed ones, since an artifact the
    /// compiler did not re-emit must still be present. Re-running with the
    /// same snapshot leaves the tree as it is.
    pub fn project(&self, current: &Snapshot) -> OutsyncResult<ProjectReport> {
        let mut report = ProjectReport::default();
        let mut pass = LinkPass {
            symlinks: self.mode == LinkMode::Auto,
            capable: None,
        };

        for (path, contents) in current.iter() {
            let target = artifact_location(&self.cache_root, path);
            let dest = artifact_location(&self.output_root, path);

            clear_file_ancestors(&self.output_root, path)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    OutsyncError::io(format!("creating output directory {}", parent.display()), e)
                })?;
            }

            let placement = if pass.symlinks {
                match self.link(&target, &dest, contents, &mut pass)? {
                    Some(placement) => placement,
                    None => {
                        warn!(
                            "Symlinks unavailable in {}, copying artifacts instead",
                            self.output_root.display()
                        );
                        pass.symlinks = false;
                        copy_into(&target, &dest, contents)?
                    }
                }
            } else {
                copy_into(&target, &dest, contents)?
            };

            trace!("{} -> {:?}", path, placement);
            match placement {
                Placement::Linked => report.linked += 1,
                Placement::Copied => report.copied += 1,
                Placement::Unchanged => report.unchanged += 1,
            }
        }

        debug!(
            "Projected {} artifacts into {} ({} linked, {} copied, {} unchanged)",
            report.total(),
            self.output_root.display(),
            report.linked,
            report.copied,
            report.unchanged
        );
        Ok(report)
    }

    /// Symlink `dest` to `target`. Returns `None` when the filesystem
    /// refuses symlinks and the caller should fall back to copying.
    fn link(
        &self,
        target: &Path,
        dest: &Path,
        contents: &[u8],
        pass: &mut LinkPass,
    ) -> OutsyncResult<Option<Placement>> {
        match fs::symlink_metadata(dest) {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(dest).is_ok_and(|existing| existing == target) {
                    return Ok(Some(Placement::Unchanged));
                }
                remove_entry(dest)?;
            }
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(dest).map_err(|e| {
                    OutsyncError::io(format!("replacing directory {}", dest.display()), e)
                })?;
            }
            Ok(_) => {
                // Copied by an earlier fallback; keep it while the bytes match
                // and symlinks are still refused
                if fs::read(dest).is_ok_and(|existing| existing == contents)
                    && !self.symlink_capable(dest, pass)
                {
                    return Ok(Some(Placement::Unchanged));
                }
                remove_entry(dest)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(OutsyncError::io(format!("inspecting {}", dest.display()), e));
            }
        }

        match (self.symlink)(target, dest) {
            Ok(()) => Ok(Some(Placement::Linked)),
            Err(e) if symlink_unsupported(&e) => {
                debug!("Symlink refused for {}: {}", dest.display(), e);
                Ok(None)
            }
            Err(e) => Err(OutsyncError::io(format!("linking {}", dest.display()), e)),
        }
    }

    /// Whether a fresh symlink can be created next to `path`.
    ///
    /// Probed once per pass; decides if a regular file found in the output
    /// tree is a copy left by an earlier fallback that should now become a
    /// link.
    fn symlink_capable(&self, path: &Path, pass: &mut LinkPass) -> bool {
        *pass.capable.get_or_insert_with(|| {
            let Some(parent) = path.parent() else {
                return false;
            };
            let probe = parent.join(format!(".outsync-probe-{}", uuid::Uuid::new_v4().simple()));
            let capable = (self.symlink)(path, &probe).is_ok();
            let _ = fs::remove_file(&probe);
            capable
        })
    }

    /// Remove output entries for artifacts that disappeared from the
    /// snapshot, returning how many were removed.
    ///
    /// Directories left empty are removed up to the output root. Cache
    /// entries are not touched.
    pub fn prune(&self, removed: &BTreeSet<String>) -> OutsyncResult<usize> {
        let mut pruned = 0;

        for path in removed {
            let path = match normalize_path(path) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Not pruning {}: {}", path, e);
                    continue;
                }
            };
            // an ancestor replaced by a file means the entry is already gone
            if !ancestors_are_dirs(&self.output_root, &path) {
                continue;
            }

            let dest = artifact_location(&self.output_root, &path);
            match fs::symlink_metadata(&dest) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => remove_entry(&dest)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(OutsyncError::io(format!("inspecting {}", dest.display()), e));
                }
            }
            pruned += 1;
            trace!("Pruned {}", path);

            let mut dir = dest.parent();
            while let Some(current) = dir {
                if current == self.output_root || !current.starts_with(&self.output_root) {
                    break;
                }
                if fs::remove_dir(current).is_err() {
                    break;
                }
                dir = current.parent();
            }
        }

        if pruned > 0 {
            debug!("Pruned {} stale entries from {}", pruned, self.output_root.display());
        }
        Ok(pruned)
    }
}

fn copy_into(target: &Path, dest: &Path, contents: &[u8]) -> OutsyncResult<Placement> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.file_type().is_symlink() => remove_entry(dest)?,
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(dest).map_err(|e| {
                OutsyncError::io(format!("replacing directory {}", dest.display()), e)
            })?;
        }
        Ok(_) => {
            if fs::read(dest).is_ok_and(|existing| existing == contents) {
                return Ok(Placement::Unchanged);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(OutsyncError::io(format!("inspecting {}", dest.display()), e)),
    }

    fs::copy(target, dest).map_err(|e| {
        OutsyncError::io(
            format!("copying {} to {}", target.display(), dest.display()),
            e,
        )
    })?;
    Ok(Placement::Copied)
}

fn remove_entry(path: &Path) -> OutsyncResult<()> {
    fs::remove_file(path).map_err(|e| OutsyncError::io(format!("removing {}", path.display()), e))
}

fn symlink_unsupported(err: &io::Error) -> bool {
    if cfg!(windows) {
        return true;
    }
    matches!(
        err.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (path, contents) in entries {
            snapshot.insert(path, *contents).unwrap();
        }
        snapshot
    }

    struct Roots {
        _temp: TempDir,
        cache: CacheStore,
        output: PathBuf,
    }

    fn roots_with(current: &Snapshot) -> Roots {
        let temp = TempDir::new().unwrap();
        let cache = CacheStore::new(temp.path().join("cache"));
        let all: BTreeSet<String> = current.paths().map(str::to_string).collect();
        cache.materialize(current, &all).unwrap();
        let output = temp.path().join("out");
        Roots {
            _temp: temp,
            cache,
            output,
        }
    }

    fn assert_complete(output: &Path, current: &Snapshot) {
        for (path, contents) in current.iter() {
            let read = fs::read(artifact_location(output, path)).unwrap();
            assert_eq!(read, contents, "content of {}", path);
        }
    }

    #[test]
    fn projects_every_artifact() {
        let current = snapshot(&[("a.js", "1"), ("nested/dir/b.js", "2")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();

        let report = projector.project(&current).unwrap();

        assert_eq!(report.total(), 2);
        assert_complete(&roots.output, &current);
    }

    #[cfg(unix)]
    #[test]
    fn links_point_into_cache() {
        let current = snapshot(&[("a.js", "1")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();

        let report = projector.project(&current).unwrap();

        assert_eq!(report.linked, 1);
        let link = roots.output.join("a.js");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        let target = fs::read_link(&link).unwrap();
        assert!(target.is_absolute());
        assert_eq!(
            fs::canonicalize(target).unwrap(),
            fs::canonicalize(roots.cache.location("a.js")).unwrap()
        );
    }

    #[test]
    fn projection_is_idempotent() {
        let current = snapshot(&[("a.js", "1"), ("b/c.js", "2")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();

        let first = projector.project(&current).unwrap();
        let second = projector.project(&current).unwrap();

        assert_eq!(first.unchanged, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.linked + second.copied, 0);
        assert_complete(&roots.output, &current);
    }

    #[test]
    fn copy_mode_writes_real_files() {
        let current = snapshot(&[("a.js", "1"), ("b/c.js", "2")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Copy).unwrap();

        let first = projector.project(&current).unwrap();
        let second = projector.project(&current).unwrap();

        assert_eq!(first.copied, 2);
        assert_eq!(second.unchanged, 2);
        let meta = fs::symlink_metadata(roots.output.join("a.js")).unwrap();
        assert!(meta.is_file());
        assert_complete(&roots.output, &current);
    }

    #[test]
    fn copy_mode_refreshes_changed_content() {
        let before = snapshot(&[("a.js", "1")]);
        let roots = roots_with(&before);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Copy).unwrap();
        projector.project(&before).unwrap();

        let after = snapshot(&[("a.js", "22")]);
        let changed: BTreeSet<String> = ["a.js".to_string()].into();
        roots.cache.materialize(&after, &changed).unwrap();
        let report = projector.project(&after).unwrap();

        assert_eq!(report.copied, 1);
        assert_complete(&roots.output, &after);
    }

    #[cfg(unix)]
    #[test]
    fn switching_to_copy_replaces_links_without_touching_cache() {
        let current = snapshot(&[("a.js", "1")]);
        let roots = roots_with(&current);
        OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto)
            .unwrap()
            .project(&current)
            .unwrap();

        let copier =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Copy).unwrap();
        let report = copier.project(&current).unwrap();

        assert_eq!(report.copied, 1);
        assert!(fs::symlink_metadata(roots.output.join("a.js")).unwrap().is_file());
        assert_eq!(roots.cache.read("a.js").unwrap(), b"1");
    }

    #[test]
    fn prune_removes_stale_entries_and_empty_dirs() {
        let current = snapshot(&[("keep.js", "k"), ("old/deep/gone.js", "g")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();
        projector.project(&current).unwrap();

        let removed: BTreeSet<String> = ["old/deep/gone.js".to_string()].into();
        let pruned = projector.prune(&removed).unwrap();

        assert_eq!(pruned, 1);
        assert!(!roots.output.join("old").exists());
        assert!(roots.output.join("keep.js").exists());
        // the cache keeps its copy
        assert_eq!(roots.cache.read("old/deep/gone.js").unwrap(), b"g");
    }

    #[test]
    fn prune_ignores_missing_entries() {
        let current = snapshot(&[("a.js", "1")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();

        let removed: BTreeSet<String> = ["never-projected.js".to_string()].into();
        assert_eq!(projector.prune(&removed).unwrap(), 0);
    }

    fn refuse_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks disabled"))
    }

    #[test]
    fn refused_symlinks_fall_back_to_copies() {
        let current = snapshot(&[("a.js", "1"), ("b/c.js", "2"), ("d.js", "3")]);
        let roots = roots_with(&current);
        let projector = OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto)
            .unwrap()
            .with_symlinker(refuse_symlink);

        let report = projector.project(&current).unwrap();

        assert_eq!(report.copied, 3);
        assert_eq!(report.linked, 0);
        for path in ["a.js", "b/c.js", "d.js"] {
            let meta = fs::symlink_metadata(artifact_location(&roots.output, path)).unwrap();
            assert!(meta.is_file());
        }
        assert_complete(&roots.output, &current);
    }

    #[test]
    fn fallback_copies_stay_while_symlinks_are_refused() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
        fn counting_refusal(_target: &Path, _link: &Path) -> io::Result<()> {
            ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "symlinks disabled"))
        }

        let current = snapshot(&[("a.js", "1"), ("b.js", "2"), ("c.js", "3")]);
        let roots = roots_with(&current);
        let projector = OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto)
            .unwrap()
            .with_symlinker(counting_refusal);
        projector.project(&current).unwrap();

        ATTEMPTS.store(0, Ordering::SeqCst);
        let report = projector.project(&current).unwrap();

        assert_eq!(report.unchanged, 3);
        // one capability probe for the whole pass
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 1);
        assert_complete(&roots.output, &current);
    }

    #[cfg(unix)]
    #[test]
    fn fallback_copies_become_links_once_symlinks_work() {
        let current = snapshot(&[("a.js", "1"), ("b/c.js", "2")]);
        let roots = roots_with(&current);
        OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto)
            .unwrap()
            .with_symlinker(refuse_symlink)
            .project(&current)
            .unwrap();

        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();
        let report = projector.project(&current).unwrap();

        assert_eq!(report.linked, 2);
        for path in ["a.js", "b/c.js"] {
            let meta = fs::symlink_metadata(artifact_location(&roots.output, path)).unwrap();
            assert!(meta.file_type().is_symlink());
        }
        assert_complete(&roots.output, &current);
    }

    #[test]
    fn prune_never_leaves_output_root() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let victim = temp.path().join("victim.txt");
        fs::write(&victim, b"keep").unwrap();
        let projector =
            OutputProjector::new(&temp.path().join("cache"), &output, LinkMode::Auto).unwrap();

        let removed: BTreeSet<String> =
            ["../victim.txt".to_string(), "/etc/hosts".to_string()].into();
        let pruned = projector.prune(&removed).unwrap();

        assert_eq!(pruned, 0);
        assert_eq!(fs::read(&victim).unwrap(), b"keep");
    }

    #[test]
    fn prune_skips_entries_under_replaced_directories() {
        let current = snapshot(&[("lib", "file")]);
        let roots = roots_with(&current);
        let projector =
            OutputProjector::new(roots.cache.root(), &roots.output, LinkMode::Auto).unwrap();
        projector.project(&current).unwrap();

        let removed: BTreeSet<String> = ["lib/index.js".to_string()].into();

        assert_eq!(projector.prune(&removed).unwrap(), 0);
        assert_complete(&roots.output, &current);
    }
}
