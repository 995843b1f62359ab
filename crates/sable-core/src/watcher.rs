//! File watcher for external source changes.
//!
//! Watches a source file (or a directory of them) and posts events into a
//! mailbox so the owning thread can schedule a reparse.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer, notify::RecursiveMode};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::mailbox::Mailbox;

/// Quiet period before a burst of file system events is reported.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// File change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File was created or modified.
    Modified(PathBuf),
    /// File was removed.
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified(path) | Self::Removed(path) => path,
        }
    }
}

/// Watcher handle; watching stops when it is dropped.
pub struct SourceWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    root: PathBuf,
}

impl SourceWatcher {
    /// Watch `path` and post changes to files with a legal extension.
    ///
    /// A file path restricts events to that file; a directory path reports
    /// every legal file directly inside it.
    pub fn new(path: impl AsRef<Path>, source: &SourceConfig, events: Mailbox<FileEvent>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (watch_path, target) = if path.is_file() {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (parent, Some(path.clone()))
        } else {
            (path.clone(), None)
        };

        let source = source.clone();
        let mut debouncer = new_debouncer(WATCH_DEBOUNCE, move |result: DebounceEventResult| {
            let batch = match result {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!("File watch error: {}", e);
                    return;
                }
            };
            for event in batch {
                let event_path = event.path;
                if !source.legal_path(&event_path) {
                    continue;
                }
                if let Some(ref target) = target
                    && !same_file(&event_path, target)
                {
                    continue;
                }

                let file_event = if event_path.exists() {
                    FileEvent::Modified(event_path)
                } else {
                    FileEvent::Removed(event_path)
                };
                tracing::debug!("Source change: {:?}", file_event);
                events.post(file_event);
            }
        })
        .map_err(|e| Error::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("{}: {}", watch_path.display(), e)))?;

        Ok(Self {
            _debouncer: debouncer,
            root: path,
        })
    }

    /// Path this watcher was created for.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Compare paths by name and canonical parent; removed files cannot be
/// canonicalized themselves.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    let parent = |p: &Path| p.parent().and_then(|dir| dir.canonicalize().ok());
    a.file_name() == b.file_name() && parent(a).is_some() && parent(a) == parent(b)
}
