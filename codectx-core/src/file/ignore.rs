use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::warn;

/// Compiled ignore rules: the project's `.gitignore` merged with
/// config-supplied patterns. Config patterns are added after the VCS
/// patterns, so they can re-ignore a path but cannot un-ignore one unless
/// explicitly negated. Immutable once compiled; a refresh builds a new set.
#[derive(Clone)]
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    pub fn compile(project_root: &Path, config_patterns: &[String]) -> anyhow::Result<Self> {
        let mut builder = GitignoreBuilder::new(project_root);

        // VCS internals are never project files.
        builder.add_line(None, ".git/")?;

        let gitignore_path = project_root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(err) = builder.add(&gitignore_path) {
                // Unreadable ignore source degrades to "no VCS patterns".
                warn!(?err, "failed to read .gitignore, continuing without it");
            }
        }

        for pattern in config_patterns {
            if let Err(err) = builder.add_line(None, pattern) {
                warn!(pattern, ?err, "skipping invalid ignore pattern");
            }
        }

        let matcher = builder.build()?;
        Ok(Self { matcher })
    }

    /// Whether `relative_path` is ignored. Matches the path and every
    /// ancestor directory, so a directory-level pattern covers the whole
    /// subtree. Side-effect-free and cheap - safe on the watcher hot path.
    pub fn is_ignored(&self, relative_path: &Path, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(relative_path, is_dir)
            .is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn gitignore_patterns_apply() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "build/\n*.tmp\n").unwrap();

        let rules = IgnoreRules::compile(temp.path(), &[]).unwrap();
        assert!(rules.is_ignored(Path::new("build"), true));
        assert!(rules.is_ignored(Path::new("build/out.log"), false));
        assert!(rules.is_ignored(Path::new("scratch.tmp"), false));
        assert!(!rules.is_ignored(Path::new("src/main.rs"), false));
    }

    #[test]
    fn config_patterns_append_after_vcs_patterns() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "build/\n").unwrap();

        let rules = IgnoreRules::compile(temp.path(), &["*.log".to_string()]).unwrap();
        assert!(rules.is_ignored(Path::new("server.log"), false));
        assert!(rules.is_ignored(Path::new("build/out.log"), false));
    }

    #[test]
    fn negated_config_pattern_can_unignore() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "*.log\n").unwrap();

        let rules = IgnoreRules::compile(temp.path(), &["!keep.log".to_string()]).unwrap();
        assert!(rules.is_ignored(Path::new("server.log"), false));
        assert!(!rules.is_ignored(Path::new("keep.log"), false));
    }

    #[test]
    fn git_directory_always_ignored() {
        let temp = tempdir().unwrap();
        let rules = IgnoreRules::compile(temp.path(), &[]).unwrap();
        assert!(rules.is_ignored(Path::new(".git/config"), false));
    }

    #[test]
    fn invalid_config_pattern_is_skipped() {
        let temp = tempdir().unwrap();
        let rules =
            IgnoreRules::compile(temp.path(), &["a[".to_string(), "*.log".to_string()]).unwrap();
        assert!(rules.is_ignored(Path::new("server.log"), false));
    }

    #[test]
    fn missing_gitignore_means_nothing_ignored() {
        let temp = tempdir().unwrap();
        let rules = IgnoreRules::compile(temp.path(), &[]).unwrap();
        assert!(!rules.is_ignored(Path::new("anything.rs"), false));
    }
}
