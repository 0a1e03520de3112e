use thiserror::Error;

/// Errors crossing the registry boundary. Routine edit failures are values,
/// not errors - see [`crate::file::modify::engine::ApplyOutcome`].
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}
