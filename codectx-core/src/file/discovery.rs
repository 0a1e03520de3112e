use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::file::ignore::IgnoreRules;

/// A path known to exist, be a regular file, and not be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the project root; used for display and matching.
    pub relative_path: PathBuf,
}

type Snapshot = BTreeMap<PathBuf, DiscoveredFile>;

/// The authoritative index of legitimate project files.
///
/// Snapshots are copy-on-write: every mutation builds a new map and swaps
/// the `Arc`, so foreground readers never block on the watcher or observe a
/// half-updated set. Entries are present or absent, never stale.
pub struct DiscoveryIndex {
    root: PathBuf,
    config_patterns: Vec<String>,
    rules: RwLock<Arc<IgnoreRules>>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DiscoveryIndex {
    /// Compile ignore rules and run the initial scan.
    pub fn new(root: &Path, config_patterns: Vec<String>) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root does not exist: {}", root.display()))?;
        let rules = IgnoreRules::compile(&root, &config_patterns)?;
        let snapshot = scan(&root, &rules);
        debug!(files = snapshot.len(), root = %root.display(), "initial project scan");
        Ok(Self {
            root,
            config_patterns,
            rules: RwLock::new(Arc::new(rules)),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current compiled ignore rules. Cheap to clone; safe to call from the
    /// watcher hot path.
    pub fn rules(&self) -> Arc<IgnoreRules> {
        self.rules.read().expect("lock poisoned").clone()
    }

    /// Resolve an input path (absolute or project-relative) to its path
    /// relative to the project root. None when outside the project.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        let abs = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        };
        if let Ok(rel) = abs.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        // The root is canonicalized; an absolute input may still reach it
        // through a symlinked prefix.
        let canon = abs.canonicalize().ok()?;
        canon
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    pub fn absolutize(&self, path: &Path) -> PathBuf {
        match self.relativize(path) {
            Some(rel) => self.root.join(rel),
            None => normalize(path),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        let Some(rel) = self.relativize(path) else {
            return false;
        };
        self.current().contains_key(&rel)
    }

    pub fn get(&self, path: &Path) -> Option<DiscoveredFile> {
        let rel = self.relativize(path)?;
        self.current().get(&rel).cloned()
    }

    /// Insert a single path after re-validating against the current ignore
    /// rules and that it is a regular file. False is a no-op: ignored, not a
    /// file, outside the project, or already present.
    pub fn add(&self, path: &Path) -> bool {
        let Some(rel) = self.relativize(path) else {
            return false;
        };
        let abs = self.root.join(&rel);
        if self.rules().is_ignored(&rel, false) {
            return false;
        }
        if !abs.is_file() {
            return false;
        }

        let mut guard = self.snapshot.write().expect("lock poisoned");
        if guard.contains_key(&rel) {
            return false;
        }
        let mut next = (**guard).clone();
        next.insert(
            rel.clone(),
            DiscoveredFile {
                path: abs,
                relative_path: rel,
            },
        );
        *guard = Arc::new(next);
        true
    }

    /// Remove an entry; false when absent.
    pub fn remove(&self, path: &Path) -> bool {
        let Some(rel) = self.relativize(path) else {
            return false;
        };
        let mut guard = self.snapshot.write().expect("lock poisoned");
        if !guard.contains_key(&rel) {
            return false;
        }
        let mut next = (**guard).clone();
        next.remove(&rel);
        *guard = Arc::new(next);
        true
    }

    /// All discovered files, sorted by relative path.
    pub fn files(&self) -> Vec<DiscoveredFile> {
        self.current().values().cloned().collect()
    }

    pub fn files_with_extension(&self, extension: &str) -> Vec<DiscoveredFile> {
        let extension = extension.trim_start_matches('.');
        self.current()
            .values()
            .filter(|f| {
                f.relative_path
                    .extension()
                    .is_some_and(|ext| ext == extension)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Substring search over relative paths for interactive completion.
    /// Ranking: exact relative-path prefix, then filename matches over path
    /// matches, shorter paths first within a rank.
    pub fn find(&self, pattern: &str) -> Vec<DiscoveredFile> {
        let snapshot = self.current();
        let mut ranked: Vec<(u8, usize, DiscoveredFile)> = Vec::new();

        for file in snapshot.values() {
            let rel = file.relative_path.to_string_lossy();
            let name = file
                .relative_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let rank = if rel.starts_with(pattern) {
                0
            } else if name.contains(pattern) {
                1
            } else if rel.contains(pattern) {
                2
            } else {
                continue;
            };
            ranked.push((rank, rel.len(), file.clone()));
        }

        ranked.sort_by(|a, b| {
            (a.0, a.1, &a.2.relative_path).cmp(&(b.0, b.1, &b.2.relative_path))
        });
        ranked.into_iter().map(|(_, _, f)| f).collect()
    }

    /// Recompile ignore rules and rescan, atomically swapping the snapshot.
    /// Used when the ignore sources themselves change or after watcher loss.
    pub fn refresh(&self) -> Result<()> {
        let rules = IgnoreRules::compile(&self.root, &self.config_patterns)?;
        let next = scan(&self.root, &rules);
        debug!(files = next.len(), "discovery index refreshed");
        *self.rules.write().expect("lock poisoned") = Arc::new(rules);
        *self.snapshot.write().expect("lock poisoned") = Arc::new(next);
        Ok(())
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("lock poisoned").clone()
    }
}

/// Full recursive walk of the project root. Symlinks are not followed, so
/// cycles terminate. Unreadable subtrees are logged and skipped - partial
/// visibility beats a hard failure mid-session. File contents are never read.
fn scan(root: &Path, rules: &IgnoreRules) -> Snapshot {
    let mut files = Snapshot::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                return true;
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            !rules.is_ignored(rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(?err, "skipping unreadable entry during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.insert(
            rel.to_path_buf(),
            DiscoveredFile {
                path: entry.path().to_path_buf(),
                relative_path: rel.to_path_buf(),
            },
        );
    }

    files
}

/// Lexical normalization: drops `.` components and resolves `..` without
/// touching the filesystem, so it also works for paths that no longer exist.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
