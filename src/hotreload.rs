//! Hot-reload watcher for the optional `config.toml` tunables file.
//!
//! Spawns a background task that watches the file for writes and re-applies
//! it onto the shared [`RuntimeConfig`] without restarting the process.

use crate::config::{RuntimeConfig, load_tunables_file};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;

/// Watch `path` and reload `runtime` whenever it changes. No-op (but still
/// spawns the watcher, so a file created later is picked up) if the file
/// doesn't exist yet.
pub fn spawn_file_watcher(path: PathBuf, runtime: RuntimeConfig) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let watch_path = path.clone();
    std::thread::spawn(move || {
        let watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                if let Ok(event) = event
                    && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                {
                    tx.send(()).ok();
                }
            },
            notify::Config::default(),
        );

        let Ok(mut watcher) = watcher else {
            tracing::warn!(path = %watch_path.display(), "failed to construct config file watcher");
            return;
        };

        let watch_dir = watch_path.parent().unwrap_or(&watch_path);
        if let Err(error) = watcher.watch(watch_dir, RecursiveMode::NonRecursive) {
            tracing::warn!(%error, path = %watch_path.display(), "failed to watch config directory");
            return;
        }

        // Park the watcher for the life of the process; dropping it would
        // stop delivery.
        std::mem::forget(watcher);
        loop {
            std::thread::park();
        }
    });

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match load_tunables_file(&path) {
                Ok(tunables) => {
                    runtime.reload(tunables);
                    tracing::info!(path = %path.display(), "reloaded scheduling tunables");
                }
                Err(error) => tracing::warn!(%error, path = %path.display(), "failed to reload tunables file"),
            }
        }
    });
}
