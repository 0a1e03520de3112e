use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_watch_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_marker_scan_bytes() -> usize {
    512 * 1024
}

/// Settings for project file discovery, watching and marker detection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileConfig {
    /// Additional ignore patterns appended after the project's .gitignore.
    /// These can re-ignore files but only un-ignore VCS patterns when
    /// explicitly negated with a leading '!'.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Whether the background file watcher runs for the session. When off,
    /// discovery is accurate only as of the last explicit refresh.
    #[serde(default = "default_watch_enabled")]
    pub watch_enabled: bool,

    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Maximum bytes read from a modified file when scanning for inline
    /// markers. Larger files are scanned up to this cap.
    #[serde(default = "default_marker_scan_bytes")]
    pub marker_scan_bytes: usize,
}

impl FileConfig {
    pub const NAMESPACE: &str = "file";
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            watch_enabled: default_watch_enabled(),
            watch_debounce_ms: default_debounce_ms(),
            marker_scan_bytes: default_marker_scan_bytes(),
        }
    }
}
