//! Routes serving cached artifacts by key.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use flix_core::MediaKey;

use super::range_header;
use crate::context::AppContext;
use crate::error::AppError;
use crate::stream::serve_file;

/// Reject names that could leave the artifact directory.
fn validate_file_name(name: &str) -> flix_core::Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(flix_core::Error::Validation(format!("invalid file name: {name}")));
    }
    Ok(())
}

/// GET /hls/{key}/{file}
///
/// Playlist, segments, subtitles and `variants.json` of a rendition.
pub async fn hls_file(
    State(ctx): State<AppContext>,
    Path((key, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let key: MediaKey = key.parse()?;
    validate_file_name(&file)?;
    let path = ctx.pipeline.layout().rendition_dir(&key).join(&file);
    Ok(serve_file(&path, range_header(&headers)).await?)
}

/// GET /preview/{key}/{file}
pub async fn preview_file(
    State(ctx): State<AppContext>,
    Path((key, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let key: MediaKey = key.parse()?;
    validate_file_name(&file)?;
    let path = ctx.pipeline.layout().previews_dir(&key).join(&file);
    Ok(serve_file(&path, None).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_validated() {
        assert!(validate_file_name("segment000.ts").is_ok());
        assert!(validate_file_name("master.m3u8").is_ok());
        for bad in ["", "../x", "a/b", "a\\b", ".staging-x", "..", "x..y"] {
            assert!(validate_file_name(bad).is_err(), "{bad}");
        }
    }
}
