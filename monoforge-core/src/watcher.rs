//! File watching for develop mode restarts.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use notify::Config as NotifyConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::plugin::ProjectWatcher;
use crate::project::{BUILD_DIR, INSTALL_DIR, TOOL_CACHE_DIR};

pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub projects_dir: PathBuf,
    /// Directory names whose contents never trigger a restart.
    pub ignored: Vec<String>,
}

impl WatcherConfig {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            projects_dir: PathBuf::from("./projects"),
            ignored: vec![
                INSTALL_DIR.to_string(),
                TOOL_CACHE_DIR.to_string(),
                BUILD_DIR.to_string(),
                ".git".to_string(),
            ],
        }
    }
}

/// Pause switch for one project's change notifications.
#[derive(Debug, Clone)]
pub struct WatchToggle {
    project: String,
    paused: Arc<AtomicBool>,
}

impl WatchToggle {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl ProjectWatcher for WatchToggle {
    fn start(&self) {
        debug!("Resuming file watching for {}", self.project);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        debug!("Pausing file watching for {}", self.project);
        self.paused.store(true, Ordering::SeqCst);
    }
}

pub struct FileWatcher {
    // Dropping the watcher stops notifications.
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    config: WatcherConfig,
    paused: DashMap<String, Arc<AtomicBool>>,
}

impl FileWatcher {
    pub fn new(mut config: WatcherConfig) -> Result<Self> {
        config.projects_dir = config
            .projects_dir
            .canonicalize()
            .map_err(|e| {
                Error::Watcher(format!(
                    "Failed to resolve {}: {}",
                    config.projects_dir.display(),
                    e
                ))
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // The receiver is gone once the watcher is being dropped.
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watcher(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&config.projects_dir, RecursiveMode::Recursive)
            .map_err(|e| Error::Watcher(format!("Failed to watch directory: {}", e)))?;
        debug!("Watching {}", config.projects_dir.display());

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            config,
            paused: DashMap::new(),
        })
    }

    /// Returns the pause switch of a project, creating it on first use.
    pub fn toggle(&self, project: &str) -> WatchToggle {
        let paused = self
            .paused
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)));
        WatchToggle {
            project: project.to_string(),
            paused: Arc::clone(paused.value()),
        }
    }

    fn is_paused(&self, project: &str) -> bool {
        self.paused
            .get(project)
            .map(|p| p.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Waits for the next batch of changes and returns the affected projects.
    ///
    /// Events arriving within the debounce window are merged into one batch.
    /// Returns `None` once the watcher has shut down.
    pub async fn next_changes(&mut self) -> Result<Option<BTreeSet<String>>> {
        loop {
            let Some(first) = self.receiver.recv().await else {
                return Ok(None);
            };
            let mut changed = self.affected_projects(&first?);

            let window = tokio::time::sleep(Duration::from_millis(self.config.debounce_ms));
            tokio::pin!(window);
            loop {
                let next = tokio::select! {
                    _ = &mut window => None,
                    next = self.receiver.recv() => next,
                };
                match next {
                    Some(event) => changed.extend(self.affected_projects(&event?)),
                    None => break,
                }
            }

            changed.retain(|project| !self.is_paused(project));
            if !changed.is_empty() {
                debug!("Changes detected in {:?}", changed);
                return Ok(Some(changed));
            }
        }
    }

    /// Projects touched by an event, ignoring access-only events.
    pub fn affected_projects(&self, event: &Event) -> BTreeSet<String> {
        if matches!(event.kind, EventKind::Access(_)) {
            return BTreeSet::new();
        }

        event
            .paths
            .iter()
            .filter_map(|path| {
                Self::file_to_project(path, &self.config.projects_dir, &self.config.ignored)
            })
            .collect()
    }

    /// Maps a path below the projects directory to its project name.
    pub fn file_to_project(file_path: &Path, projects_dir: &Path, ignored: &[String]) -> Option<String> {
        let relative = file_path.strip_prefix(projects_dir).ok()?;
        let mut components = relative.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        });

        let project = components.next()?.to_string();
        // A project directory itself being touched is not a source change.
        let mut rest = components.peekable();
        rest.peek()?;
        if rest.any(|name| ignored.iter().any(|i| i == name.as_ref())) {
            return None;
        }
        Some(project)
    }
}
