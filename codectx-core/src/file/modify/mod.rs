pub mod block;
pub mod closest;
pub mod engine;

pub use block::{extract_blocks, EditBlock, MalformedBlocks};
pub use engine::{ApplyOutcome, EditEngine};
