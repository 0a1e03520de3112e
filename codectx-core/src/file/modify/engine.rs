use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::file::context::{AccessMode, ContextRegistry};
use crate::file::modify::block::EditBlock;
use crate::file::modify::closest::closest_match;

/// Exactly one outcome per edit block. Expected failures are values here,
/// never errors - a model proposing an edit to the wrong file is routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { new_content: String },
    /// Target path is not in the context registry.
    NotInContext,
    /// Target is in context but Reference mode.
    NotMutable,
    /// Search text not found, even whitespace-normalized. Feedback describes
    /// the closest region of the file, when one exists.
    SearchNotFound { feedback: Option<String> },
    /// Search text occurs more than once; applying would risk editing the
    /// wrong location, so nothing is touched.
    AmbiguousMatch { count: usize },
    IoError { detail: String },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Applies AI-proposed search/replace edits to files the registry marks
/// mutable. Owns no persistent state: each apply is a pure function of the
/// registry snapshot, the file bytes and the block, plus the file write.
/// Foreground-only - the watcher never triggers it.
pub struct EditEngine {
    registry: Arc<ContextRegistry>,
}

impl EditEngine {
    pub fn new(registry: Arc<ContextRegistry>) -> Self {
        Self { registry }
    }

    /// Apply a single block: access check, unique-match search, atomic write.
    pub async fn apply(&self, block: &EditBlock) -> ApplyOutcome {
        let Some(entry) = self.registry.get(Path::new(&block.path)) else {
            debug!(path = %block.path, message_id = %block.message_id, "edit target not in context");
            return ApplyOutcome::NotInContext;
        };
        if entry.mode == AccessMode::Reference {
            return ApplyOutcome::NotMutable;
        }

        let content = match tokio::fs::read_to_string(&entry.path).await {
            Ok(content) => content,
            Err(err) => {
                return ApplyOutcome::IoError {
                    detail: format!("failed to read {}: {err}", block.path),
                }
            }
        };

        let new_content = match replace_unique(&content, &block.search, &block.replace) {
            Ok(new_content) => new_content,
            Err(outcome) => return outcome,
        };

        if let Err(err) = write_atomic(&entry.path, &new_content).await {
            return ApplyOutcome::IoError {
                detail: format!("failed to write {}: {err:?}", block.path),
            };
        }

        info!(path = %block.path, "applied edit block");
        ApplyOutcome::Applied { new_content }
    }

    /// Apply blocks sequentially in the order given. Blocks targeting the
    /// same file see earlier edits already applied; a failure on one block
    /// never rolls back or skips independent blocks. The cancel flag is
    /// honored between blocks, never mid-write, so the returned vec may be
    /// shorter than the input on cancellation.
    pub async fn apply_batch(
        &self,
        blocks: &[EditBlock],
        cancel: &AtomicBool,
    ) -> Vec<ApplyOutcome> {
        let mut outcomes = Vec::with_capacity(blocks.len());
        for block in blocks {
            if cancel.load(Ordering::Acquire) {
                debug!(
                    applied = outcomes.len(),
                    total = blocks.len(),
                    "edit batch cancelled"
                );
                break;
            }
            outcomes.push(self.apply(block).await);
        }
        outcomes
    }
}

/// Two-pass matching: exact contiguous substring first, then one
/// whitespace-normalized retry. No third, more aggressive fallback is
/// attempted; ambiguity and misses are surfaced, not guessed around.
fn replace_unique(content: &str, search: &str, replace: &str) -> Result<String, ApplyOutcome> {
    if search.is_empty() {
        // Empty search appends to the end of the file.
        return Ok(format!("{content}{replace}"));
    }

    match content.matches(search).count() {
        1 => Ok(content.replacen(search, replace, 1)),
        0 => {
            if let Some(result) = replace_whitespace_normalized(content, search, replace) {
                return Ok(result);
            }
            let feedback =
                closest_match(content, search).and_then(|m| m.correction_feedback());
            Err(ApplyOutcome::SearchNotFound { feedback })
        }
        count => Err(ApplyOutcome::AmbiguousMatch { count }),
    }
}

/// Line-window comparison under collapsed whitespace. Applies only when the
/// normalized search matches exactly one region; zero or several matches
/// fall back to the caller's original outcome.
fn replace_whitespace_normalized(content: &str, search: &str, replace: &str) -> Option<String> {
    let content_lines: Vec<&str> = content.lines().collect();
    let search_norm: Vec<String> = search.lines().map(normalize_whitespace).collect();
    if search_norm.is_empty() || search_norm.len() > content_lines.len() {
        return None;
    }

    let content_norm: Vec<String> = content_lines
        .iter()
        .map(|line| normalize_whitespace(line))
        .collect();

    let mut starts = Vec::new();
    for i in 0..=content_lines.len() - search_norm.len() {
        if content_norm[i..i + search_norm.len()] == search_norm[..] {
            starts.push(i);
        }
    }
    let [start] = starts[..] else {
        return None;
    };

    let mut out_lines: Vec<&str> = Vec::with_capacity(content_lines.len());
    out_lines.extend(&content_lines[..start]);
    out_lines.extend(replace.lines());
    out_lines.extend(&content_lines[start + search_norm.len()..]);

    let mut out = out_lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

fn normalize_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write-then-rename in the target directory, so a crash mid-write can
/// never leave a truncated file behind.
async fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let dir = path.parent().context("target has no parent directory")?;
    let name = path
        .file_name()
        .context("target has no file name")?
        .to_string_lossy();
    let tmp = dir.join(format!(".{name}.codectx-tmp"));

    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("failed to write temp file {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to rename over {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::discovery::DiscoveryIndex;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cancel_flag_stops_batch_between_blocks() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.py"), "one\n").unwrap();
        fs::write(temp.path().join("b.py"), "two\n").unwrap();
        let index = Arc::new(DiscoveryIndex::new(temp.path(), vec![]).unwrap());
        let registry = Arc::new(ContextRegistry::new(index));
        registry.add("a.py", AccessMode::Mutable).unwrap();
        registry.add("b.py", AccessMode::Mutable).unwrap();
        let engine = EditEngine::new(registry);

        let blocks = vec![
            EditBlock {
                path: "a.py".to_string(),
                search: "one".to_string(),
                replace: "1".to_string(),
                message_id: "m".to_string(),
            },
            EditBlock {
                path: "b.py".to_string(),
                search: "two".to_string(),
                replace: "2".to_string(),
                message_id: "m".to_string(),
            },
        ];

        let cancel = AtomicBool::new(false);
        let first = engine.apply_batch(&blocks[..1], &cancel).await;
        assert!(first[0].is_applied());

        // The session cancels after the first block landed.
        cancel.store(true, Ordering::Release);
        let rest = engine.apply_batch(&blocks[1..], &cancel).await;

        // Shorter than the input: the remaining block was never attempted.
        assert!(rest.len() < blocks[1..].len());
        assert_eq!(fs::read_to_string(temp.path().join("a.py")).unwrap(), "1\n");
        assert_eq!(fs::read_to_string(temp.path().join("b.py")).unwrap(), "two\n");
    }

    #[test]
    fn unique_match_replaces_only_that_region() {
        let content = "line1\nsearch\nline2";
        let result = replace_unique(content, "search", "replaced").unwrap();
        assert_eq!(result, "line1\nreplaced\nline2");
    }

    #[test]
    fn double_match_is_ambiguous_with_count() {
        let content = "line1\nsearch\nline2\nsearch\nline3";
        let err = replace_unique(content, "search", "replaced").unwrap_err();
        assert_eq!(err, ApplyOutcome::AmbiguousMatch { count: 2 });
    }

    #[test]
    fn missing_search_reports_not_found_with_feedback() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let err = replace_unique(content, "fn main() {\n    println!(\"bye\");\n}", "x")
            .unwrap_err();
        let ApplyOutcome::SearchNotFound { feedback } = err else {
            panic!("expected SearchNotFound");
        };
        assert!(feedback.unwrap().contains("println!(\"hi\");"));
    }

    #[test]
    fn whitespace_normalized_retry_succeeds() {
        let content = "fn main() {\n    let x  =   1;\n}\n";
        // Different indentation and spacing than the file.
        let result = replace_unique(content, "let x = 1;", "let x = 2;").unwrap();
        assert_eq!(result, "fn main() {\nlet x = 2;\n}\n");
    }

    #[test]
    fn ambiguous_normalized_retry_keeps_original_outcome() {
        let content = "foo  bar\nmiddle\nfoo   bar\n";
        let err = replace_unique(content, "foo bar", "baz").unwrap_err();
        // Normalized comparison finds two candidate regions; the original
        // exact-match outcome is surfaced instead of picking one.
        assert!(matches!(err, ApplyOutcome::SearchNotFound { .. }));
    }

    #[test]
    fn empty_search_appends() {
        let result = replace_unique("existing\n", "", "tail\n").unwrap();
        assert_eq!(result, "existing\ntail\n");
    }

    #[test]
    fn trailing_newline_preserved_through_normalized_replace() {
        let content = "one\n  two  three\nfour\n";
        let result = replace_unique(content, "two three", "2 3").unwrap();
        assert_eq!(result, "one\n2 3\nfour\n");
    }
}
