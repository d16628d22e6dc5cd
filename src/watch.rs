//! Hot-reload watcher
//!
//! One cooperatively cancellable background thread per engine. It watches
//! the database file's parent directory for modify events and, when the
//! event names the database file, opens a fresh [`LookupService`] over the
//! same path and mode and hands it to the callback. The running engine is
//! never touched; the replacement's lifecycle belongs to the host.

use crate::error::{GeoIpError, Result};
use crate::lookup::{LookupService, UpdateCallback};
use crate::reader::CacheMode;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

/// How often the event loop wakes to check the cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running watcher task. Cancelling stores the shutdown flag
/// and joins the thread; dropping without cancel does the same.
pub(crate) struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub(crate) fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the watcher thread for `path`, reopening with `mode` on changes.
pub(crate) fn spawn(
    path: PathBuf,
    mode: CacheMode,
    callback: UpdateCallback,
) -> Result<WatcherHandle> {
    let file_name = path
        .file_name()
        .ok_or_else(|| GeoIpError::Watch(format!("{} has no file name", path.display())))?
        .to_os_string();
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let thread = thread::Builder::new()
        .name("geodat-watcher".to_string())
        .spawn(move || watch_loop(&directory, &file_name, &path, mode, callback, &flag))
        .map_err(|e| GeoIpError::Watch(format!("failed to spawn watcher thread: {}", e)))?;

    Ok(WatcherHandle {
        shutdown,
        thread: Some(thread),
    })
}

fn watch_loop(
    directory: &Path,
    file_name: &std::ffi::OsStr,
    path: &Path,
    mode: CacheMode,
    callback: UpdateCallback,
    shutdown: &AtomicBool,
) {
    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher = match Watcher::new(tx, Config::default()) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!(error = %e, "failed to create file watcher");
            return;
        }
    };
    if let Err(e) = watcher.watch(directory, RecursiveMode::NonRecursive) {
        error!(directory = %directory.display(), error = %e, "failed to watch directory");
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if !is_database_modify(&event, file_name) {
                    continue;
                }
                match LookupService::open(path, mode) {
                    Ok(replacement) => callback(replacement),
                    // A writer may still be mid-update; the next modify
                    // event retries.
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "reopen after modify failed")
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "file watcher error");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("file watcher channel closed");
                return;
            }
        }
    }
}

fn is_database_modify(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    matches!(event.kind, EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind};

    fn modify_event(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from(path))
    }

    #[test]
    fn matches_only_the_database_file() {
        let name = std::ffi::OsString::from("GeoIP.dat");
        assert!(is_database_modify(&modify_event("/tmp/db/GeoIP.dat"), &name));
        assert!(!is_database_modify(&modify_event("/tmp/db/other.dat"), &name));

        let create = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/tmp/db/GeoIP.dat"));
        assert!(!is_database_modify(&create, &name));
    }
}
