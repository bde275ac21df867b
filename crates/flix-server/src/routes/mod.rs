//! Route handlers for the HTTP API.
//!
//! Library paths in URLs (`{*path}`) are relative to the current root;
//! artifact URLs address the cache by [`MediaKey`](flix_core::MediaKey).

pub mod artifacts;
pub mod library;
pub mod media;

use axum::http::{header, HeaderMap};

/// The raw `Range` header of a request, if any.
pub(crate) fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}
