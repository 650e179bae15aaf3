//! Filesystem watcher (spec.md §4.6).
//!
//! Wraps `notify`'s recursive watch in an unbounded queue of changed paths.
//! Directory-only events and paths under the private directory or `.git`
//! are filtered at the source; a rename/move is reported as two separate
//! paths (old and new), each enqueued independently.

use crate::error::{Error, Result};
use crate::models::RepoPaths;
use notify::event::{CreateKind, RemoveKind};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    pub receiver: Receiver<PathBuf>,
}

impl FileWatcher {
    pub fn start(paths: &RepoPaths) -> Result<Self> {
        let (tx, rx) = channel();
        let private_dir = paths.private_dir();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
            let Ok(event) = res else { return };
            let kind = event.kind;
            for path in event.paths {
                if path.starts_with(&private_dir) || path.components().any(|c| c.as_os_str() == ".git") {
                    continue;
                }
                if is_directory_event(kind, &path) {
                    continue;
                }
                let _ = tx.send(path);
            }
        })
        .map_err(to_io_error)?;

        watcher.watch(&paths.root, RecursiveMode::Recursive).map_err(to_io_error)?;

        Ok(FileWatcher { _watcher: watcher, receiver: rx })
    }
}

/// `notify` tags directory creates/removes explicitly; everything else
/// (metadata changes, ambiguous `Any` kinds) falls back to statting the
/// path, which still resolves directory modify events for paths that
/// still exist.
fn is_directory_event(kind: EventKind, path: &Path) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) => true,
        EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => false,
        _ => path.is_dir(),
    }
}

fn to_io_error(e: notify::Error) -> Error {
    Error::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_create_and_remove_are_directory_events() {
        assert!(is_directory_event(EventKind::Create(CreateKind::Folder), Path::new("/tmp/nonexistent")));
        assert!(is_directory_event(EventKind::Remove(RemoveKind::Folder), Path::new("/tmp/nonexistent")));
    }

    #[test]
    fn file_create_and_remove_are_not_directory_events() {
        assert!(!is_directory_event(EventKind::Create(CreateKind::File), Path::new("/tmp/nonexistent")));
        assert!(!is_directory_event(EventKind::Remove(RemoveKind::File), Path::new("/tmp/nonexistent")));
    }

    #[test]
    fn ambiguous_kind_falls_back_to_stat() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(is_directory_event(EventKind::Any, tmp.path()));
        assert!(!is_directory_event(EventKind::Any, &tmp.path().join("missing-file")));
    }
}
