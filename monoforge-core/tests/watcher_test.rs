use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use monoforge_core::error::Error;
use monoforge_core::plugin::ProjectWatcher;
use monoforge_core::{FileWatcher, WatcherConfig};
use tempfile::TempDir;

fn ignored() -> Vec<String> {
    WatcherConfig::default().ignored
}

#[test]
fn test_file_to_project() {
    let projects_dir = Path::new("/workspace/projects");
    let ignored = ignored();

    let cases = [
        ("/workspace/projects/web/src/index.js", Some("web")),
        ("/workspace/projects/web/package.json", Some("web")),
        ("/workspace/projects/api/lib/deep/nested.ts", Some("api")),
        ("/workspace/projects/web", None),
        ("/workspace/projects/web/node_modules/react/index.js", None),
        ("/workspace/projects/web/src/.toolcache/out.js", None),
        ("/workspace/projects/web/build/index.js", None),
        ("/workspace/other/web/src/index.js", None),
        ("/workspace/projects", None),
    ];

    for (path, expected) in cases {
        assert_eq!(
            FileWatcher::file_to_project(Path::new(path), projects_dir, &ignored).as_deref(),
            expected,
            "path: {}",
            path
        );
    }
}

#[test]
fn test_default_config() {
    let config = WatcherConfig::new("/workspace/projects");
    assert_eq!(config.debounce_ms, 300);
    assert_eq!(config.projects_dir, Path::new("/workspace/projects"));
    assert!(config.ignored.contains(&"node_modules".to_string()));
}

fn setup(projects: &[&str]) -> (TempDir, FileWatcher) {
    let temp_dir = TempDir::new().unwrap();
    for name in projects {
        fs::create_dir_all(temp_dir.path().join("projects").join(name).join("src")).unwrap();
    }
    let mut config = WatcherConfig::new(temp_dir.path().join("projects"));
    config.debounce_ms = 100;
    let watcher = FileWatcher::new(config).unwrap();
    (temp_dir, watcher)
}

#[test]
fn test_toggle_pauses_and_resumes() {
    let (_temp_dir, watcher) = setup(&["web"]);
    let toggle = watcher.toggle("web");

    assert!(!toggle.is_paused());
    toggle.stop();
    assert!(toggle.is_paused());
    // Toggles of the same project share their state.
    assert!(watcher.toggle("web").is_paused());
    toggle.start();
    assert!(!watcher.toggle("web").is_paused());
}

#[test]
fn test_missing_projects_dir_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = FileWatcher::new(WatcherConfig::new(temp_dir.path().join("projects")));
    assert!(result.is_err());
}

#[test]
fn test_notify_errors_become_watcher_errors() {
    let err = Error::from(notify::Error::generic("inotify limit reached"));
    assert!(matches!(err, Error::Watcher(ref message) if message.contains("inotify limit reached")));
}

#[tokio::test]
async fn test_changes_are_reported_per_project() {
    let (temp_dir, mut watcher) = setup(&["web", "api"]);

    fs::write(
        temp_dir.path().join("projects/web/src/index.js"),
        "console.log(1)",
    )
    .unwrap();

    let changed = tokio::time::timeout(Duration::from_secs(10), watcher.next_changes())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(changed, BTreeSet::from(["web".to_string()]));
}

#[tokio::test]
async fn test_paused_projects_are_skipped() {
    let (temp_dir, mut watcher) = setup(&["web", "api"]);
    watcher.toggle("web").stop();

    fs::write(temp_dir.path().join("projects/web/src/index.js"), "a").unwrap();
    fs::write(temp_dir.path().join("projects/api/src/index.js"), "b").unwrap();

    let changed = tokio::time::timeout(Duration::from_secs(10), watcher.next_changes())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(changed, BTreeSet::from(["api".to_string()]));
}
