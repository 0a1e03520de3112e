use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use codectx_core::{AccessMode, ApplyOutcome, FileConfig};

use fixture::Fixture;

#[test]
fn gitignore_and_config_patterns_combine() {
    let fixture = Fixture::with_config(FileConfig {
        ignore_patterns: vec!["*.md".to_string()],
        ..FileConfig::default()
    });

    let files = fixture.manager.index().files();
    let rels = fixture::rel_paths(&files);
    assert!(rels.contains(&Path::new("src/app.py")));
    // build/ excluded by .gitignore, *.md by config.
    assert!(!rels.iter().any(|p| p.starts_with("build")));
    assert!(!rels.contains(&Path::new("README.md")));
}

#[tokio::test]
async fn add_then_edit_round_trip() {
    let fixture = Fixture::new();
    let results = fixture
        .manager
        .add_context("src/app.py", AccessMode::Mutable)
        .unwrap();
    assert!(results[0].1);

    let response = "\
Switching to a guard clause:\n\
```python\nsrc/app.py\n<<<<<<< SEARCH\n    return process(event)\n=======\n    if event is None:\n        return None\n    return process(event)\n>>>>>>> REPLACE\n```";
    let results = fixture
        .manager
        .apply_response(response, "msg-1", &AtomicBool::new(false))
        .await
        .unwrap();

    assert!(results[0].1.is_applied());
    assert_eq!(
        fixture.read("src/app.py"),
        "def handler(event):\n    if event is None:\n        return None\n    return process(event)\n"
    );
}

#[tokio::test]
async fn reference_file_is_never_modified() {
    let fixture = Fixture::new();
    fixture
        .manager
        .add_context("src/app.py", AccessMode::Reference)
        .unwrap();
    let before = fixture.read("src/app.py");

    let response = "\
```\nsrc/app.py\n<<<<<<< SEARCH\ndef handler(event):\n=======\ndef handler(evt):\n>>>>>>> REPLACE\n```";
    let results = fixture
        .manager
        .apply_response(response, "msg-1", &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(results[0].1, ApplyOutcome::NotMutable);
    // Byte-for-byte identical.
    assert_eq!(fixture.read("src/app.py"), before);
}

#[tokio::test]
async fn ambiguous_match_leaves_file_untouched() {
    let fixture = Fixture::new();
    fixture
        .manager
        .add_context("src/util.py", AccessMode::Mutable)
        .unwrap();
    let before = fixture.read("src/util.py");

    // "x = 1" occurs twice in util.py.
    let response = "\
```\nsrc/util.py\n<<<<<<< SEARCH\nx = 1\n=======\nx = 2\n>>>>>>> REPLACE\n```";
    let results = fixture
        .manager
        .apply_response(response, "msg-1", &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(results[0].1, ApplyOutcome::AmbiguousMatch { count: 2 });
    assert_eq!(fixture.read("src/util.py"), before);
}

#[tokio::test]
async fn sequential_blocks_see_earlier_edits() {
    let fixture = Fixture::new();
    fixture
        .manager
        .add_context("src/util.py", AccessMode::Mutable)
        .unwrap();

    // First block disambiguates; second edits what the first produced.
    let response = "\
```\nsrc/util.py\n<<<<<<< SEARCH\nx = 1\nx = 1\n=======\nx = 1\ny = 2\n>>>>>>> REPLACE\n```\n\
```\nsrc/util.py\n<<<<<<< SEARCH\ny = 2\n=======\ny = 3\n>>>>>>> REPLACE\n```";
    let results = fixture
        .manager
        .apply_response(response, "msg-1", &AtomicBool::new(false))
        .await
        .unwrap();

    assert!(results.iter().all(|(_, outcome)| outcome.is_applied()));
    assert_eq!(fixture.read("src/util.py"), "x = 1\ny = 3\n");
}

#[test]
fn context_entries_stay_within_discovery() {
    let fixture = Fixture::new();
    fixture
        .manager
        .add_context("**/*.py", AccessMode::Mutable)
        .unwrap();
    fixture
        .manager
        .add_context("build/out.bin", AccessMode::Reference)
        .unwrap();

    let entries = fixture.manager.list_context(None);
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(fixture.manager.is_project_file(&entry.path));
    }
    assert!(!entries
        .iter()
        .any(|e| e.relative_path == PathBuf::from("build/out.bin")));
}

#[test]
fn mode_switch_and_glob_remove() {
    let fixture = Fixture::new();
    fixture
        .manager
        .add_context("src/*.py", AccessMode::Reference)
        .unwrap();
    assert!(fixture
        .manager
        .set_context_mode(Path::new("src/app.py"), AccessMode::Mutable));

    let mutable = fixture.manager.list_context(Some(AccessMode::Mutable));
    assert_eq!(mutable.len(), 1);

    let removed = fixture.manager.remove_context("src/*").unwrap();
    assert_eq!(removed.len(), 2);
    assert!(fixture.manager.list_context(None).is_empty());
}
