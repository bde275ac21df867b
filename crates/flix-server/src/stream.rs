//! Byte-range file serving for raw library files and HLS artifacts.
//!
//! Bodies are streamed with `ReaderStream` in 1 MiB chunks, so memory stays
//! bounded regardless of file size.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Read size of streamed bodies.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A parsed `Range: bytes=...` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` or `bytes=start-end`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

/// Parse a `Range` header value. Anything that is not a single byte range
/// yields `None` and the header is ignored.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start_str, end_str) = ranges.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return end_str.parse().ok().map(ByteRange::Suffix);
    }

    let start = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some(ByteRange::From { start, end })
}

/// Inclusive byte span of `range` within a resource of `size` bytes.
///
/// `Ok(None)` means the range is malformed (`start > end`) and should be
/// ignored. A start at or beyond `size` is [`flix_core::Error::InvalidRange`].
pub fn resolve_range(range: ByteRange, size: u64) -> flix_core::Result<Option<(u64, u64)>> {
    match range {
        ByteRange::From { start, end } => {
            if end.is_some_and(|end| start > end) {
                return Ok(None);
            }
            if start >= size {
                return Err(flix_core::Error::InvalidRange { size });
            }
            let end = end.unwrap_or(size - 1).min(size - 1);
            Ok(Some((start, end)))
        }
        ByteRange::Suffix(len) => {
            if len == 0 || size == 0 {
                return Err(flix_core::Error::InvalidRange { size });
            }
            Ok(Some((size.saturating_sub(len), size - 1)))
        }
    }
}

/// Guess the MIME type from the file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "ts" => "video/mp2t",
        "m3u8" => "application/vnd.apple.mpegurl",
        "vtt" => "text/vtt",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Serve `path`, honouring an optional `Range` header value.
pub async fn serve_file(path: &Path, range_header: Option<&str>) -> flix_core::Result<Response> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| flix_core::Error::not_found("file", path.display()))?;
    if !metadata.is_file() {
        return Err(flix_core::Error::not_found("file", path.display()));
    }

    let size = metadata.len();
    let content_type = guess_content_type(path);
    let span = match range_header.and_then(parse_range_header) {
        Some(range) => resolve_range(range, size)?,
        None => None,
    };

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| flix_core::Error::not_found("file", path.display()))?;

    match span {
        Some((start, end)) => {
            let length = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start)).await?;
            let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK_SIZE));

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
                    (header::CONTENT_LENGTH, length.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
        None => {
            let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn parse_range_forms() {
        assert_eq!(
            parse_range_header("bytes=0-99"),
            Some(ByteRange::From { start: 0, end: Some(99) })
        );
        assert_eq!(
            parse_range_header("bytes=500-"),
            Some(ByteRange::From { start: 500, end: None })
        );
        assert_eq!(parse_range_header("bytes=-200"), Some(ByteRange::Suffix(200)));
    }

    #[test]
    fn parse_range_invalid() {
        assert!(parse_range_header("invalid").is_none());
        assert!(parse_range_header("bytes=abc-def").is_none());
        assert!(parse_range_header("bytes=0-1,5-6").is_none());
        assert!(parse_range_header("items=0-1").is_none());
    }

    #[test]
    fn resolve_clamps_end() {
        let r = ByteRange::From { start: 900, end: Some(5000) };
        assert_eq!(resolve_range(r, 1000).unwrap(), Some((900, 999)));
    }

    #[test]
    fn resolve_start_past_end_is_invalid() {
        let r = ByteRange::From { start: 1000, end: None };
        assert!(matches!(
            resolve_range(r, 1000),
            Err(flix_core::Error::InvalidRange { size: 1000 })
        ));
    }

    #[test]
    fn resolve_inverted_range_is_ignored() {
        let r = ByteRange::From { start: 50, end: Some(10) };
        assert_eq!(resolve_range(r, 1000).unwrap(), None);
    }

    #[test]
    fn resolve_suffix() {
        assert_eq!(resolve_range(ByteRange::Suffix(100), 1000).unwrap(), Some((900, 999)));
        assert_eq!(resolve_range(ByteRange::Suffix(5000), 1000).unwrap(), Some((0, 999)));
    }

    #[test]
    fn content_types() {
        assert_eq!(guess_content_type(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(guess_content_type(Path::new("master.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(guess_content_type(Path::new("segment000.ts")), "video/mp2t");
        assert_eq!(guess_content_type(Path::new("subtitle_3.vtt")), "text/vtt");
        assert_eq!(guess_content_type(Path::new("variants.json")), "application/json");
        assert_eq!(guess_content_type(Path::new("cover.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("song.flac")), "audio/flac");
        assert_eq!(guess_content_type(Path::new("notes")), "application/octet-stream");
    }

    fn thousand_bytes() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn serves_partial_content() {
        let (_dir, path) = thousand_bytes();
        let response = serve_file(&path, Some("bytes=0-99")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/1000");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), 100);
        assert_eq!(body[99], 99);
    }

    #[tokio::test]
    async fn serves_whole_file_without_range() {
        let (_dir, path) = thousand_bytes();
        let response = serve_file(&path, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), 1000);
    }

    #[tokio::test]
    async fn range_from_offset_reads_tail() {
        let (_dir, path) = thousand_bytes();
        let response = serve_file(&path, Some("bytes=990-")).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let expected: Vec<u8> = (990..1000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn unsatisfiable_range_is_error() {
        let (_dir, path) = thousand_bytes();
        let err = serve_file(&path, Some("bytes=1000-")).await.unwrap_err();
        assert_eq!(err.http_status(), 416);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve_file(&dir.path().join("gone.mp4"), None).await.unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
