use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::file::config::FileConfig;
use crate::file::context::ContextRegistry;
use crate::file::discovery::DiscoveryIndex;
use crate::file::marker::{is_probably_binary, Marker, MarkerKind, MarkerScanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WatcherState {
    Idle,
    Watching,
    /// Terminal. Discovery is accurate only as of the last manual refresh;
    /// the one-time Degraded event tells the interaction loop to say so.
    Stopped,
}

/// Events pushed to the interaction loop over a bounded channel. The loop
/// selects on this between prompts; the watcher never touches loop state.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A marker comment was detected and the file auto-added to context.
    /// Within one batch these arrive in interrupt-priority order.
    Marker {
        path: PathBuf,
        kind: MarkerKind,
        line: usize,
        text: String,
    },
    /// The watch loop failed and will not restart this session.
    Degraded { reason: String },
}

/// Background observer of the project tree.
///
/// Structural changes (create/delete) patch the [`DiscoveryIndex`]; content
/// changes are scanned for inline markers which auto-add the file to the
/// [`ContextRegistry`]. One long-lived worker thread per session; the
/// `notify` callback only forwards into a channel, all real work happens on
/// the worker.
pub struct ChangeWatcher {
    context: Arc<WatchContext>,
    debounce: Duration,
    state: Arc<Mutex<WatcherState>>,
    watcher: Option<RecommendedWatcher>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ChangeWatcher {
    pub fn new(
        index: Arc<DiscoveryIndex>,
        registry: Arc<ContextRegistry>,
        config: &FileConfig,
    ) -> Result<Self> {
        let context = WatchContext {
            index,
            registry,
            scanner: MarkerScanner::new()?,
            marker_scan_bytes: config.marker_scan_bytes,
        };
        Ok(Self {
            context: Arc::new(context),
            debounce: Duration::from_millis(config.watch_debounce_ms),
            state: Arc::new(Mutex::new(WatcherState::Idle)),
            watcher: None,
            worker: None,
        })
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock().expect("lock poisoned")
    }

    /// Idle -> Watching. Returns the receiver the interaction loop selects
    /// on for marker and degradation events.
    pub fn start(&mut self) -> Result<mpsc::Receiver<WatchEvent>> {
        if self.state() != WatcherState::Idle {
            bail!("watcher already started (state: {})", self.state());
        }

        let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(res);
        })?;
        watcher.watch(self.context.index.root(), RecursiveMode::Recursive)?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let context = self.context.clone();
        let state = self.state.clone();
        let debounce = self.debounce;

        // Watching must be set before the worker exists, or a worker that
        // fails immediately writes Stopped and then loses it to this write.
        *self.state.lock().expect("lock poisoned") = WatcherState::Watching;
        let spawned = thread::Builder::new()
            .name("codectx-file-watcher".to_string())
            .spawn(move || run_worker(&context, &fs_rx, &event_tx, debounce, &state));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                *self.state.lock().expect("lock poisoned") = WatcherState::Idle;
                return Err(err.into());
            }
        };

        self.watcher = Some(watcher);
        self.worker = Some(worker);
        Ok(event_rx)
    }

    /// Watching -> Stopped, bounded: dropping the `notify` watcher closes
    /// the filesystem channel, which ends the worker's next (timed) recv.
    pub fn stop(&mut self) {
        *self.state.lock().expect("lock poisoned") = WatcherState::Stopped;
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    context: &WatchContext,
    fs_rx: &std_mpsc::Receiver<notify::Result<Event>>,
    event_tx: &mpsc::Sender<WatchEvent>,
    debounce: Duration,
    state: &Mutex<WatcherState>,
) {
    if let Err(err) = watch_loop(context, fs_rx, event_tx, debounce) {
        // No automatic restart: log, surface once, stop.
        warn!(?err, "file watcher failed, discovery is now stale");
        *state.lock().expect("lock poisoned") = WatcherState::Stopped;
        let _ = event_tx.blocking_send(WatchEvent::Degraded {
            reason: err.to_string(),
        });
    }
}

fn watch_loop(
    context: &WatchContext,
    fs_rx: &std_mpsc::Receiver<notify::Result<Event>>,
    event_tx: &mpsc::Sender<WatchEvent>,
    debounce: Duration,
) -> Result<(), notify::Error> {
    loop {
        let first = match fs_rx.recv() {
            Ok(result) => result?,
            // Sender dropped: session shutdown.
            Err(_) => return Ok(()),
        };

        // Drain whatever lands inside the debounce window into one batch so
        // marker priority applies across simultaneous saves.
        let mut batch = vec![first];
        let deadline = Instant::now() + debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match fs_rx.recv_timeout(remaining) {
                Ok(result) => batch.push(result?),
                Err(_) => break,
            }
        }

        for event in context.process_batch(batch) {
            if event_tx.blocking_send(event).is_err() {
                // Receiver gone: nobody is listening any more.
                return Ok(());
            }
        }
    }
}

struct WatchContext {
    index: Arc<DiscoveryIndex>,
    registry: Arc<ContextRegistry>,
    scanner: MarkerScanner,
    marker_scan_bytes: usize,
}

impl WatchContext {
    /// Reconcile one event batch against the index and registry, returning
    /// marker events in interrupt-priority order (urgent first).
    fn process_batch(&self, batch: Vec<Event>) -> Vec<WatchEvent> {
        // path -> saw a content-bearing change (create or data modify)
        let mut touched: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for event in batch {
            let content_change = matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            );
            for path in event.paths {
                *touched.entry(path).or_insert(false) |= content_change;
            }
        }

        // Synchronous, side-effect-free filter on the hot path: ignored
        // events never reach the index.
        let rules = self.index.rules();
        let mut hits: Vec<(u8, WatchEvent)> = Vec::new();

        for (path, content_change) in touched {
            let Some(rel) = self.index.relativize(&path) else {
                continue;
            };
            if rules.is_ignored(&rel, false) {
                continue;
            }

            if !path.exists() {
                if self.index.remove(&path) {
                    debug!(path = %rel.display(), "file deleted, removed from discovery");
                }
                // Keep the registry a subset of discovery.
                self.registry.remove_path(&path);
                continue;
            }
            if !path.is_file() {
                continue;
            }

            if self.index.add(&path) {
                debug!(path = %rel.display(), "file created, added to discovery");
            }

            if !content_change {
                continue;
            }
            if let Some(marker) = self.scan_for_marker(&path) {
                // Every marked file is auto-added regardless of which
                // marker wins the interrupt.
                self.registry.add_path(&path, marker.kind.access_mode());
                let priority = marker.kind.interrupt_priority().unwrap_or(u8::MAX);
                hits.push((
                    priority,
                    WatchEvent::Marker {
                        path: path.clone(),
                        kind: marker.kind,
                        line: marker.line,
                        text: marker.text,
                    },
                ));
            }
        }

        hits.sort_by_key(|(priority, _)| *priority);
        hits.into_iter().map(|(_, event)| event).collect()
    }

    /// Read (bounded), skip binary, and return the file's dominant marker:
    /// the one that would interrupt first, falling back to the first found.
    fn scan_for_marker(&self, path: &Path) -> Option<Marker> {
        // Only the head of the file is ever pulled in; a huge artifact must
        // not stall the worker or get allocated wholesale.
        let mut bytes = Vec::new();
        let read = std::fs::File::open(path)
            .and_then(|file| file.take(self.marker_scan_bytes as u64).read_to_end(&mut bytes));
        if let Err(err) = read {
            // File may be mid-save or unreadable; skip this cycle.
            debug!(?err, path = %path.display(), "could not read modified file");
            return None;
        }
        if is_probably_binary(&bytes) {
            return None;
        }

        let content = String::from_utf8_lossy(&bytes);
        self.scanner
            .scan(&content)
            .into_iter()
            .min_by_key(|m| m.kind.interrupt_priority().unwrap_or(u8::MAX))
    }
}
