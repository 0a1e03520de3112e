pub mod file;

// Public library API - the interaction loop and LLM loop consume these.
pub use file::config::FileConfig;
pub use file::context::{AccessMode, ContextEntry, ContextPrompt, ContextRegistry};
pub use file::discovery::{DiscoveredFile, DiscoveryIndex};
pub use file::manager::FileManager;
pub use file::marker::{Marker, MarkerKind};
pub use file::modify::{extract_blocks, ApplyOutcome, EditBlock, EditEngine, MalformedBlocks};
pub use file::watcher::{ChangeWatcher, WatchEvent, WatcherState};
