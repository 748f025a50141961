//! Hot-reload file watcher for the configuration file.
//!
//! Watches the directory holding the config file (editors often replace the
//! file rather than write it in place) and re-reads it into the tree whenever
//! it changes. Debouncing coalesces rapid save patterns into one edit batch,
//! so each save fires change tokens at most once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use tracing::{debug, warn};

use super::loader::reload_config;
use super::tree::ConfigTree;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches one JSON config file and reloads it into a [`ConfigTree`].
pub struct ConfigFileWatcher {
    tree: ConfigTree,
    path: PathBuf,
    debounce: Duration,
}

impl ConfigFileWatcher {
    /// Create a watcher for `path` feeding `tree`.
    pub fn new(tree: ConfigTree, path: impl Into<PathBuf>) -> Self {
        Self {
            tree,
            path: path.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce duration.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Start watching. Drop the returned handle to stop.
    pub fn start(self) -> Result<WatcherHandle> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer =
            new_debouncer(self.debounce, notify_tx).context("initializing file watcher")?;

        let dir = watch_dir(&self.path);
        debouncer
            .watcher()
            .watch(&dir, notify::RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {}", dir.display()))?;

        let tree = self.tree;
        let path = self.path;
        let file_name = path.file_name().map(|n| n.to_os_string());

        let thread = std::thread::spawn(move || {
            // Ends when the debouncer (and with it the sender) is dropped.
            while let Ok(result) = notify_rx.recv() {
                let events = match result {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "config watcher error");
                        continue;
                    }
                };

                let touched = events.iter().any(|event| {
                    event.kind == DebouncedEventKind::Any
                        && event.path.file_name().map(|n| n.to_os_string()) == file_name
                });
                if !touched {
                    continue;
                }

                debug!(path = %path.display(), "config file changed");
                if let Err(e) = reload_config(&tree, &path) {
                    warn!(
                        path = %path.display(),
                        error = %format!("{e:#}"),
                        "config reload failed, keeping previous configuration"
                    );
                }
            }
        });

        Ok(WatcherHandle {
            _debouncer: debouncer,
            _thread: thread,
        })
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Handle that keeps the file watcher alive. Drop to stop watching.
pub struct WatcherHandle {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    _thread: std::thread::JoinHandle<()>,
}
