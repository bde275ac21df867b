//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`flix_core::Error`]
//! converts with `?` and renders as `{error, code}` with the
//! status from [`flix_core::Error::http_status`]. A route may pin the status
//! with [`AppError::with_status`]; the `code` still names the cause.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: flix_core::Error,
    status: Option<StatusCode>,
}

impl AppError {
    pub fn new(inner: flix_core::Error) -> Self {
        Self {
            inner,
            status: None,
        }
    }

    /// Respond with `status` instead of the one derived from the error.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| {
            StatusCode::from_u16(self.inner.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        })
    }

    pub fn inner(&self) -> &flix_core::Error {
        &self.inner
    }
}

impl From<flix_core::Error> for AppError {
    fn from(e: flix_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.inner, "Server error in handler");
        }

        // A 416 must say how large the resource is.
        if let flix_core::Error::InvalidRange { size } = self.inner {
            return (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
            )
                .into_response();
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
