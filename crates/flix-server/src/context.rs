//! Application context shared by all request handlers.
//!
//! [`AppContext`] wraps the immutable infrastructure (config, tool runner,
//! worker pool, media pipeline) in `Arc`s. The served directory is the one
//! mutable piece and lives in [`LibraryRoot`], read per request.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flix_av::{SharedRunner, ToolRegistry};
use flix_core::config::Config;
use flix_core::key::normalize_relative;
use flix_core::{ArtifactKind, ArtifactLayout, MediaKey};
use tokio::sync::watch;

use crate::pipeline::MediaPipeline;
use crate::pool::WorkerPool;

// ---------------------------------------------------------------------------
// LibraryRoot
// ---------------------------------------------------------------------------

/// The directory currently being served.
///
/// Swapping it is an explicit [`LibraryRoot::set`]; subscribers (the file
/// watcher) are notified and retarget.
#[derive(Debug)]
pub struct LibraryRoot {
    current: watch::Sender<PathBuf>,
}

/// A library file resolved against the current root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Normalized path relative to the root, always `/`-separated.
    pub relative: String,
    pub absolute: PathBuf,
    pub key: MediaKey,
}

impl LibraryRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (current, _) = watch::channel(dir.into());
        Self { current }
    }

    pub fn get(&self) -> PathBuf {
        self.current.borrow().clone()
    }

    /// Replace the root. The directory must exist.
    pub fn set(&self, dir: &Path) -> flix_core::Result<PathBuf> {
        let dir = std::fs::canonicalize(dir).map_err(|e| {
            flix_core::Error::Validation(format!("invalid directory {}: {e}", dir.display()))
        })?;
        if !dir.is_dir() {
            return Err(flix_core::Error::Validation(format!(
                "not a directory: {}",
                dir.display()
            )));
        }
        tracing::info!(root = %dir.display(), "Library root changed");
        self.current.send_replace(dir.clone());
        Ok(dir)
    }

    pub fn subscribe(&self) -> watch::Receiver<PathBuf> {
        self.current.subscribe()
    }

    /// Resolve a client-supplied relative path to an existing file under the
    /// current root. Absolute paths and `..` segments are rejected.
    pub fn resolve(&self, relative: &str) -> flix_core::Result<MediaSource> {
        let normalized = normalize_relative(relative);
        if normalized.is_empty() {
            return Err(flix_core::Error::Validation("empty path".into()));
        }
        let escapes = relative.starts_with('/')
            || Path::new(&normalized)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(flix_core::Error::Validation(format!(
                "path must stay inside the library: {relative}"
            )));
        }

        let absolute = self.get().join(&normalized);
        if !absolute.is_file() {
            return Err(flix_core::Error::not_found("file", &normalized));
        }

        Ok(MediaSource {
            key: MediaKey::derive(&normalized),
            relative: normalized,
            absolute,
        })
    }
}

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub root: Arc<LibraryRoot>,
    /// External tool runner used by every generator.
    pub runner: SharedRunner,
    /// Discovered tool binaries, for reporting.
    pub tools: Arc<ToolRegistry>,
    pub pool: Arc<WorkerPool>,
    pub pipeline: Arc<MediaPipeline>,
}

impl AppContext {
    /// Build the context: create the cache layout, clear staging areas left
    /// by a previous run, and wire the pipeline to the pool.
    pub fn new(
        config: Config,
        runner: SharedRunner,
        tools: ToolRegistry,
    ) -> flix_core::Result<Self> {
        ArtifactLayout::new(&config.cache.dir).ensure_dirs()?;
        // Canonical paths, so the cache can be excluded from listings when it
        // lives inside the library.
        let layout = ArtifactLayout::new(canonical(&config.cache.dir));

        let mut swept = 0;
        for kind in ArtifactKind::ALL {
            swept += flix_av::staging::sweep_stale(&layout.root().join(kind.dir_name()));
        }
        if swept > 0 {
            tracing::info!(swept, "Removed stale staging directories");
        }

        let config = Arc::new(config);
        let pool = Arc::new(WorkerPool::new(config.workers.pool_size));
        let pipeline = Arc::new(MediaPipeline::new(
            config.clone(),
            runner.clone(),
            layout,
            pool.clone(),
        ));
        let root = Arc::new(LibraryRoot::new(canonical(&config.library.root)));

        Ok(Self {
            config,
            root,
            runner,
            tools: Arc::new(tools),
            pool,
            pipeline,
        })
    }

    /// Cache directory to leave out of listings and watch events.
    pub fn cache_root(&self) -> &Path {
        self.pipeline.layout().root()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
