use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::file::config::FileConfig;
use crate::file::context::{AccessMode, ContextEntry, ContextPrompt, ContextRegistry};
use crate::file::discovery::{DiscoveredFile, DiscoveryIndex};
use crate::file::error::ContextError;
use crate::file::modify::{extract_blocks, ApplyOutcome, EditBlock, EditEngine, MalformedBlocks};
use crate::file::watcher::{ChangeWatcher, WatchEvent, WatcherState};

/// Session-scoped facade over discovery, context and edit application.
///
/// Owns one of each component, wired in dependency order, and exposes the
/// surface the interaction loop and the LLM loop call. Context state lives
/// for the session only; nothing here is persisted.
pub struct FileManager {
    config: FileConfig,
    index: Arc<DiscoveryIndex>,
    registry: Arc<ContextRegistry>,
    engine: EditEngine,
    watcher: ChangeWatcher,
}

impl FileManager {
    /// Scan the project and assemble the components. The watcher is
    /// constructed but not started; call [`start_watching`](Self::start_watching)
    /// once the event receiver has somewhere to go.
    pub fn new(project_root: &Path, config: FileConfig) -> Result<Self> {
        let index = Arc::new(DiscoveryIndex::new(
            project_root,
            config.ignore_patterns.clone(),
        )?);
        let registry = Arc::new(ContextRegistry::new(index.clone()));
        let engine = EditEngine::new(registry.clone());
        let watcher = ChangeWatcher::new(index.clone(), registry.clone(), &config)?;

        info!(
            root = %index.root().display(),
            files = index.len(),
            "file manager initialized"
        );
        Ok(Self {
            config,
            index,
            registry,
            engine,
            watcher,
        })
    }

    pub fn index(&self) -> &Arc<DiscoveryIndex> {
        &self.index
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Start background watching, unless disabled in config. Returns the
    /// event receiver the interaction loop selects on.
    pub fn start_watching(&mut self) -> Result<Option<mpsc::Receiver<WatchEvent>>> {
        if !self.config.watch_enabled {
            info!("file watching disabled by config");
            return Ok(None);
        }
        Ok(Some(self.watcher.start()?))
    }

    pub fn stop_watching(&mut self) {
        self.watcher.stop();
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher.state()
    }

    /// `/add` command: path or glob, with the requested access mode.
    pub fn add_context(
        &self,
        path_or_glob: &str,
        mode: AccessMode,
    ) -> Result<Vec<(PathBuf, bool)>, ContextError> {
        self.registry.add(path_or_glob, mode)
    }

    /// `/drop` command.
    pub fn remove_context(&self, path_or_glob: &str) -> Result<Vec<(PathBuf, bool)>, ContextError> {
        self.registry.remove(path_or_glob)
    }

    /// `/mode` command: switch an entry between reference and mutable.
    pub fn set_context_mode(&self, path: &Path, mode: AccessMode) -> bool {
        self.registry.set_mode(path, mode)
    }

    /// `/context` command: current entries, ordered by relative path.
    pub fn list_context(&self, mode: Option<AccessMode>) -> Vec<ContextEntry> {
        self.registry.list(mode)
    }

    /// Interactive path completion over the discovery index.
    pub fn find_files(&self, pattern: &str) -> Vec<DiscoveredFile> {
        self.index.find(pattern)
    }

    pub fn is_project_file(&self, path: &Path) -> bool {
        self.index.contains(path)
    }

    /// Rescan the project. The recovery path after watcher degradation, and
    /// the refresh path after ignore sources change.
    pub fn refresh(&self) -> Result<()> {
        self.index.refresh()?;
        // Entries whose files vanished while the watcher was down would
        // otherwise linger and break the registry-within-discovery invariant.
        for entry in self.registry.list(None) {
            if !self.index.contains(&entry.path) {
                self.registry.remove_path(&entry.path);
            }
        }
        Ok(())
    }

    pub async fn generate_context_prompt(&self) -> ContextPrompt {
        self.registry.generate_context_prompt().await
    }

    /// Extract SEARCH/REPLACE blocks from a model response and apply them in
    /// order. Malformed block syntax fails the whole response before any file
    /// is touched; per-block failures after that are outcomes, not errors.
    /// On cancellation the result covers only the blocks attempted.
    pub async fn apply_response(
        &self,
        content: &str,
        message_id: &str,
        cancel: &AtomicBool,
    ) -> Result<Vec<(EditBlock, ApplyOutcome)>, MalformedBlocks> {
        let blocks = extract_blocks(content, message_id)?;
        let outcomes = self.engine.apply_batch(&blocks, cancel).await;
        Ok(blocks.into_iter().zip(outcomes).collect())
    }
}
