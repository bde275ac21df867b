//! File watcher background task.
//!
//! Watches the current library root for new or changed video files. A file
//! is handed to [`MediaPipeline::prefetch`](crate::pipeline::MediaPipeline::prefetch)
//! once it has settled (no further events for `settle_time`). When the root
//! is swapped the watcher moves to the new directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flix_core::FileKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

type Pending = Arc<Mutex<HashMap<PathBuf, Instant>>>;

/// Run until `cancel` fires.
pub async fn run_watcher(ctx: AppContext, cancel: CancellationToken) {
    let watch_config = &ctx.config.watch;
    if !watch_config.enabled {
        tracing::info!("File watcher disabled");
        return;
    }
    let settle_time = Duration::from_secs(watch_config.settle_time_secs);

    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
    let pending_events = pending.clone();
    let mut watcher: RecommendedWatcher =
        match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                let now = Instant::now();
                let mut map = pending_events.lock();
                for path in event.paths {
                    map.insert(path, now);
                }
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!("Failed to create file watcher: {e}");
                return;
            }
        };

    let mut root_rx = ctx.root.subscribe();
    let mut watched = root_rx.borrow_and_update().clone();
    watch_dir(&mut watcher, &watched);

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = root_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = root_rx.borrow_and_update().clone();
                if next != watched {
                    if let Err(e) = watcher.unwatch(&watched) {
                        tracing::debug!("Failed to unwatch {}: {e}", watched.display());
                    }
                    pending.lock().clear();
                    watched = next;
                    watch_dir(&mut watcher, &watched);
                }
            }
            _ = tick.tick() => {
                for path in take_settled(&pending, settle_time) {
                    handle_settled(&ctx, &watched, &path);
                }
            }
        }
    }

    tracing::info!("File watcher stopped");
}

fn watch_dir(watcher: &mut RecommendedWatcher, dir: &Path) {
    match watcher.watch(dir, RecursiveMode::Recursive) {
        Ok(()) => tracing::info!("Watching directory: {}", dir.display()),
        Err(e) => tracing::warn!("Failed to watch {}: {e}", dir.display()),
    }
}

/// Remove and return the paths with no event for at least `settle_time`.
fn take_settled(pending: &Pending, settle_time: Duration) -> Vec<PathBuf> {
    let now = Instant::now();
    let mut settled = Vec::new();
    pending.lock().retain(|path, last_seen| {
        if now.duration_since(*last_seen) >= settle_time {
            settled.push(path.clone());
            false
        } else {
            true
        }
    });
    settled
}

fn handle_settled(ctx: &AppContext, root: &Path, path: &Path) {
    if !FileKind::from_path(path).is_video() || path.starts_with(ctx.cache_root()) {
        return;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return;
    };
    if relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
    {
        return;
    }
    match ctx.root.resolve(&relative.to_string_lossy()) {
        Ok(source) => {
            tracing::info!(path = %source.relative, "Video file change detected; scheduling artifacts");
            ctx.pipeline.prefetch(source);
        }
        // Usually a file that vanished again.
        Err(e) => tracing::debug!(path = %path.display(), "Ignoring watch event: {e}"),
    }
}
