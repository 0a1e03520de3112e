use regex::Regex;
use thiserror::Error;

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// One proposed (search, replace) pair targeting one file. Ephemeral -
/// constructed per apply attempt, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBlock {
    /// Target path as the model referenced it; resolved against the project
    /// root at apply time.
    pub path: String,
    pub search: String,
    pub replace: String,
    /// Opaque identifier of the originating message, for error reporting.
    pub message_id: String,
}

/// Malformed block syntax is reported, never thrown past the caller as a
/// fault: the model produced it, the conversation gets to hear about it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "malformed SEARCH/REPLACE blocks: SEARCH={search_markers}, dividers={divider_markers}, \
     REPLACE={replace_markers} - all counts must be equal"
)]
pub struct MalformedBlocks {
    pub search_markers: usize,
    pub divider_markers: usize,
    pub replace_markers: usize,
}

/// Extract SEARCH/REPLACE edit blocks from raw model output.
///
/// Expected shape, fenced:
///
/// ````text
/// ```lang
/// path/to/file.rs
/// <<<<<<< SEARCH
/// old text
/// =======
/// new text
/// >>>>>>> REPLACE
/// ```
/// ````
///
/// A pre-flight marker-balance check rejects content whose markers do not
/// pair up, since a truncated block silently dropping an edit is worse than
/// an error the model can react to.
pub fn extract_blocks(content: &str, message_id: &str) -> Result<Vec<EditBlock>, MalformedBlocks> {
    pre_flight_check(content)?;

    // Non-greedy captures; the empty-search form captures "" before the
    // divider. Search/replace keep their exact bytes minus the structural
    // trailing newline.
    let pattern = Regex::new(
        r"(?s)```\w*\n(.+?)\n<<<<<<< SEARCH\n(.*?)=======\n(.*?)>>>>>>> REPLACE\n```",
    )
    .expect("block pattern is valid");

    let mut blocks = Vec::new();
    for caps in pattern.captures_iter(content) {
        blocks.push(EditBlock {
            path: caps[1].trim().to_string(),
            search: strip_structural_newline(&caps[2]),
            replace: strip_structural_newline(&caps[3]),
            message_id: message_id.to_string(),
        });
    }
    Ok(blocks)
}

fn strip_structural_newline(captured: &str) -> String {
    captured
        .strip_suffix('\n')
        .unwrap_or(captured)
        .to_string()
}

fn pre_flight_check(content: &str) -> Result<(), MalformedBlocks> {
    let search_markers = content.matches(SEARCH_MARKER).count();
    let replace_markers = content.matches(REPLACE_MARKER).count();
    let divider_markers = content
        .lines()
        .filter(|line| line.trim_end() == DIVIDER_MARKER)
        .count();

    if search_markers == replace_markers && search_markers <= divider_markers {
        Ok(())
    } else {
        Err(MalformedBlocks {
            search_markers,
            divider_markers,
            replace_markers,
        })
    }
}
