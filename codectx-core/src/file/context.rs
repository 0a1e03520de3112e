use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::file::discovery::{DiscoveredFile, DiscoveryIndex};
use crate::file::error::ContextError;

/// File access modes defining what the agent may do with a context file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Visible to the agent but immutable.
    Reference,
    /// Visible and editable via search/replace blocks.
    Mutable,
}

/// A discovered file explicitly made visible to the agent this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    /// Absolute path - the registry key, so one file can never be
    /// double-entered under two spellings.
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub mode: AccessMode,
}

/// Path arguments are resolved once at the registry boundary into a closed
/// variant; downstream logic never re-inspects raw strings for wildcards.
enum PathSpec {
    Exact(PathBuf),
    Glob(GlobMatcher),
}

impl PathSpec {
    /// Inputs containing `*`, `?` or `[` always parse as globs, and a
    /// malformed glob is an error rather than a silent exact-path fallback.
    /// A file name with a literal bracket is addressed through a character
    /// class: `data[[]0].py` matches `data[0].py`.
    fn parse(input: &str) -> Result<Self, ContextError> {
        if input.contains(['*', '?', '[']) {
            // literal_separator keeps `*` within one path segment; `**`
            // crosses segments.
            let glob = GlobBuilder::new(input)
                .literal_separator(true)
                .build()
                .map_err(|source| ContextError::InvalidGlob {
                    pattern: input.to_string(),
                    source,
                })?;
            Ok(Self::Glob(glob.compile_matcher()))
        } else {
            Ok(Self::Exact(PathBuf::from(input)))
        }
    }
}

/// Rendered prompt context, partitioned by mode so the model can be told
/// what it may change.
#[derive(Debug, Clone, Default)]
pub struct ContextPrompt {
    pub reference: String,
    pub mutable: String,
}

/// The curated subset of discovered files the agent may see this session.
///
/// Sole authority for "may this file be mutated". Entries may only exist for
/// paths currently in the [`DiscoveryIndex`]; ignored or deleted files fail
/// to add rather than silently succeeding. All mutation is serialized
/// through one mutex, so a watcher auto-add and an explicit `/add` can never
/// race between membership check and insert.
pub struct ContextRegistry {
    index: Arc<DiscoveryIndex>,
    entries: Mutex<BTreeMap<PathBuf, ContextEntry>>,
}

impl ContextRegistry {
    pub fn new(index: Arc<DiscoveryIndex>) -> Self {
        Self {
            index,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a single path or glob pattern. Globs expand against the discovery
    /// index only - never the raw filesystem - so undiscovered files can
    /// never enter context. Per resolved path: false when not discovered or
    /// already present with the same mode, true on insert or mode change.
    pub fn add(
        &self,
        path_or_glob: &str,
        mode: AccessMode,
    ) -> Result<Vec<(PathBuf, bool)>, ContextError> {
        let spec = PathSpec::parse(path_or_glob)?;
        let mut entries = self.entries.lock().expect("lock poisoned");
        let mut results = Vec::new();

        match spec {
            PathSpec::Exact(path) => {
                match self.index.get(&path) {
                    Some(file) => {
                        let added = insert_entry(&mut entries, file, mode);
                        results.push((entries_key(&self.index, &path), added));
                    }
                    None => results.push((entries_key(&self.index, &path), false)),
                };
            }
            PathSpec::Glob(matcher) => {
                for file in self.index.files() {
                    if !matcher.is_match(&file.relative_path) {
                        continue;
                    }
                    let path = file.path.clone();
                    let added = insert_entry(&mut entries, file, mode);
                    results.push((path, added));
                }
            }
        }

        Ok(results)
    }

    /// Exact-path add used by the watcher's marker auto-add. Same validation
    /// and result semantics as [`add`](Self::add) with an exact path.
    pub fn add_path(&self, path: &Path, mode: AccessMode) -> bool {
        let Some(file) = self.index.get(path) else {
            return false;
        };
        let mut entries = self.entries.lock().expect("lock poisoned");
        insert_entry(&mut entries, file, mode)
    }

    /// Remove a single path or glob pattern. Globs match against entries
    /// currently in context. Removing an absent path is a false no-op.
    pub fn remove(&self, path_or_glob: &str) -> Result<Vec<(PathBuf, bool)>, ContextError> {
        let spec = PathSpec::parse(path_or_glob)?;
        let mut entries = self.entries.lock().expect("lock poisoned");

        let results = match spec {
            PathSpec::Exact(path) => {
                let key = entries_key(&self.index, &path);
                let removed = entries.remove(&key).is_some();
                vec![(key, removed)]
            }
            PathSpec::Glob(matcher) => {
                let matched: Vec<PathBuf> = entries
                    .values()
                    .filter(|e| matcher.is_match(&e.relative_path))
                    .map(|e| e.path.clone())
                    .collect();
                matched
                    .into_iter()
                    .map(|p| {
                        let removed = entries.remove(&p).is_some();
                        (p, removed)
                    })
                    .collect()
            }
        };

        Ok(results)
    }

    /// Drop an exact path from context. Used by the watcher when a file is
    /// deleted on disk, preserving the registry-within-discovery invariant.
    pub fn remove_path(&self, path: &Path) -> bool {
        let key = entries_key(&self.index, path);
        self.entries
            .lock()
            .expect("lock poisoned")
            .remove(&key)
            .is_some()
    }

    /// Change access mode in place; false when the path is not in context.
    pub fn set_mode(&self, path: &Path, mode: AccessMode) -> bool {
        let key = entries_key(&self.index, path);
        let mut entries = self.entries.lock().expect("lock poisoned");
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.mode = mode;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &Path) -> Option<ContextEntry> {
        let key = entries_key(&self.index, path);
        self.entries
            .lock()
            .expect("lock poisoned")
            .get(&key)
            .cloned()
    }

    /// Entries ordered by relative path, optionally filtered by mode.
    pub fn list(&self, mode: Option<AccessMode>) -> Vec<ContextEntry> {
        let entries = self.entries.lock().expect("lock poisoned");
        let mut out: Vec<ContextEntry> = entries
            .values()
            .filter(|e| mode.is_none_or(|m| e.mode == m))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("lock poisoned").is_empty()
    }

    /// Empty the registry. Explicit session reset only, never implicit.
    pub fn clear(&self) {
        self.entries.lock().expect("lock poisoned").clear();
    }

    /// Render each entry's path and current content for the LLM prompt,
    /// partitioned by mode. Unreadable entries get a placeholder instead of
    /// failing the whole prompt.
    pub async fn generate_context_prompt(&self) -> ContextPrompt {
        let entries = self.list(None);
        let mut prompt = ContextPrompt::default();

        for entry in entries {
            let section = match entry.mode {
                AccessMode::Reference => &mut prompt.reference,
                AccessMode::Mutable => &mut prompt.mutable,
            };
            match tokio::fs::read_to_string(&entry.path).await {
                Ok(content) => {
                    section.push_str(&format!(
                        "\n{}:\n```\n{}\n```\n",
                        entry.relative_path.display(),
                        content
                    ));
                }
                Err(err) => {
                    warn!(?err, path = %entry.path.display(), "failed to read context file");
                    section.push_str(&format!(
                        "\n{}: [Error reading file]\n",
                        entry.relative_path.display()
                    ));
                }
            }
        }

        prompt
    }
}

fn entries_key(index: &DiscoveryIndex, path: &Path) -> PathBuf {
    index.absolutize(path)
}

fn insert_entry(
    entries: &mut BTreeMap<PathBuf, ContextEntry>,
    file: DiscoveredFile,
    mode: AccessMode,
) -> bool {
    if let Some(existing) = entries.get(&file.path) {
        if existing.mode == mode {
            return false;
        }
    }
    entries.insert(
        file.path.clone(),
        ContextEntry {
            path: file.path,
            relative_path: file.relative_path,
            mode,
        },
    );
    true
}
