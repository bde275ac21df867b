//! Routes addressing a library file by its relative path.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use flix_core::artifact::PLAYLIST_NAME;
use flix_core::{MediaKey, MediaMetadata};
use serde::Serialize;

use super::range_header;
use crate::context::{AppContext, MediaSource};
use crate::error::AppError;
use crate::stream::serve_file;

/// URL of the HLS playlist of `key`.
pub fn playlist_url(key: &MediaKey) -> String {
    format!("/hls/{key}/{PLAYLIST_NAME}")
}

/// GET /file/{*path}
pub async fn file(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let source = ctx.root.resolve(&path)?;
    Ok(serve_file(&source.absolute, range_header(&headers)).await?)
}

/// GET /thumbnail/{*path}
///
/// When no thumbnail can be produced the fallback image is served with a
/// 404 status.
pub async fn thumbnail(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let source = ctx.root.resolve(&path)?;
    match ctx.pipeline.thumbnail(&source).await {
        Ok(jpeg) => Ok(serve_file(&jpeg, None).await?),
        Err(e) => {
            tracing::debug!(path = %source.relative, "Serving fallback thumbnail: {e}");
            fallback_thumbnail(&ctx).await
        }
    }
}

async fn fallback_thumbnail(ctx: &AppContext) -> Result<Response, AppError> {
    let missing = || flix_core::Error::not_found("thumbnail", "fallback image");
    let path = ctx.config.server.fallback_thumbnail.as_ref().ok_or_else(missing)?;
    let bytes = tokio::fs::read(path).await.map_err(|_| missing())?;
    Ok((
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, crate::stream::guess_content_type(path))],
        bytes,
    )
        .into_response())
}

/// GET /metadata/{*path}
///
/// A file that cannot be probed has no metadata: 404.
pub async fn metadata(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Json<MediaMetadata>, AppError> {
    let source = ctx.root.resolve(&path)?;
    let metadata = ctx
        .pipeline
        .metadata(&source)
        .await
        .map_err(|e| AppError::from(e).with_status(StatusCode::NOT_FOUND))?;
    Ok(Json(metadata))
}

#[derive(Debug, Serialize)]
pub struct PreviewsResponse {
    pub key: MediaKey,
    pub previews: Vec<String>,
}

/// GET /previews/{*path}
pub async fn previews(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Json<PreviewsResponse>, AppError> {
    let source = ctx.root.resolve(&path)?;
    let files = ctx.pipeline.previews(&source).await?;
    let previews = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| format!("/preview/{}/{}", source.key, name.to_string_lossy()))
        .collect();
    Ok(Json(PreviewsResponse {
        key: source.key,
        previews,
    }))
}

/// GET /stream/{*path}
///
/// Waits for the rendition (building it on first request), then redirects
/// to its playlist. Any failure to build it is a 500.
pub async fn stream(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Redirect, AppError> {
    let source = ctx.root.resolve(&path)?;
    ensure_rendition(&ctx, &source).await?;
    Ok(Redirect::temporary(&playlist_url(&source.key)))
}

async fn ensure_rendition(ctx: &AppContext, source: &MediaSource) -> Result<(), AppError> {
    ctx.pipeline
        .rendition(source)
        .await
        .map(|_| ())
        .map_err(|e| AppError::from(e).with_status(StatusCode::INTERNAL_SERVER_ERROR))
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub key: MediaKey,
    pub playlist: String,
    pub encoder: Option<flix_av::VideoEncoder>,
}

/// POST /process/{*path}
pub async fn process(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Json<ProcessResponse>, AppError> {
    let source = ctx.root.resolve(&path)?;
    ensure_rendition(&ctx, &source).await?;
    Ok(Json(ProcessResponse {
        status: "success",
        playlist: playlist_url(&source.key),
        key: source.key,
        encoder: ctx.pipeline.selected_encoder(),
    }))
}
