//! Library-level routes: health, listing, root selection, status, tools.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::context::{AppContext, MediaSource};
use crate::error::AppError;
use crate::listing::{list_files as walk_library, FileEntry};

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /files
///
/// Lists the library and schedules metadata and thumbnails for every video
/// that does not have them yet. The response does not wait for that work.
pub async fn list_files(State(ctx): State<AppContext>) -> Result<Json<Vec<FileEntry>>, AppError> {
    let root = ctx.root.get();
    let exclude = ctx.cache_root().to_path_buf();
    let walk_root = root.clone();
    let files = tokio::task::spawn_blocking(move || walk_library(&walk_root, Some(&exclude)))
        .await
        .map_err(|e| flix_core::Error::Internal(format!("listing task failed: {e}")))??;

    for entry in files.iter().filter(|f| f.kind.is_video()) {
        ctx.pipeline.prefetch(MediaSource {
            relative: entry.path.clone(),
            absolute: root.join(&entry.path),
            key: entry.key.clone(),
        });
    }

    tracing::info!(root = %root.display(), count = files.len(), "Listed library");
    Ok(Json(files))
}

#[derive(Debug, Deserialize)]
pub struct SetDirRequest {
    pub directory: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SetDirResponse {
    pub status: &'static str,
    pub dir: PathBuf,
}

/// POST /set_dir
pub async fn set_dir(
    State(ctx): State<AppContext>,
    Json(req): Json<SetDirRequest>,
) -> Result<Json<SetDirResponse>, AppError> {
    let dir = ctx.root.set(&req.directory)?;
    Ok(Json(SetDirResponse {
        status: "success",
        dir,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub root: PathBuf,
    pub pool_size: usize,
    /// Tasks queued or running in the worker pool.
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub in_flight_generations: usize,
    /// `None` until the first rendition selects an encoder.
    pub encoder: Option<flix_av::VideoEncoder>,
}

/// GET /status
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        root: ctx.root.get(),
        pool_size: ctx.pool.size(),
        pending_tasks: ctx.pool.pending(),
        running_tasks: ctx.pool.running(),
        in_flight_generations: ctx.pipeline.cache().in_flight(),
        encoder: ctx.pipeline.selected_encoder(),
    })
}

/// GET /tools
pub async fn tools(State(ctx): State<AppContext>) -> Result<Json<Vec<flix_av::ToolInfo>>, AppError> {
    let registry = ctx.tools.clone();
    let infos = tokio::task::spawn_blocking(move || registry.check_all())
        .await
        .map_err(|e| flix_core::Error::Internal(format!("tool check failed: {e}")))?;
    Ok(Json(infos))
}
