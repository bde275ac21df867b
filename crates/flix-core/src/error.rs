//! Unified error type for the media server.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for route handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes of the pipeline and its glue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "file", "thumbnail").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A byte range starts at or beyond the end of the resource.
    #[error("Range not satisfiable for resource of {size} bytes")]
    InvalidRange {
        /// Size of the resource in bytes.
        size: u64,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool binary is not installed or not on `PATH`.
    #[error("Tool unavailable: {tool}")]
    ToolUnavailable {
        /// Name of the missing tool.
        tool: String,
    },

    /// An external tool (ffmpeg, ffprobe) exited unsuccessfully.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description, usually the tail of stderr.
        message: String,
    },

    /// An external tool exceeded its time budget and was killed.
    #[error("Tool timeout [{tool}]: killed after {after:?}")]
    Timeout {
        /// Name of the tool that was killed.
        tool: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// Media probing produced output that could not be understood.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Generating a cache artifact failed.
    #[error("Generation error [{kind}]: {message}")]
    Generation {
        /// The artifact kind that failed (e.g. "rendition").
        kind: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::InvalidRange { .. } => 416,
            Error::Io { .. } => 500,
            Error::ToolUnavailable { .. } => 503,
            Error::Tool { .. } => 502,
            Error::Timeout { .. } => 504,
            Error::Probe(_) => 422,
            Error::Generation { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Validation(_) => "validation_error",
            Error::InvalidRange { .. } => "invalid_range",
            Error::Io { .. } => "io_error",
            Error::ToolUnavailable { .. } => "tool_unavailable",
            Error::Tool { .. } => "tool_error",
            Error::Timeout { .. } => "timeout",
            Error::Probe(_) => "probe_error",
            Error::Generation { .. } => "generation_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// True for failures of an external process (non-zero exit or timeout).
    pub fn is_subprocess_failure(&self) -> bool {
        matches!(self, Error::Tool { .. } | Error::Timeout { .. })
    }

    /// An equivalent error for another receiver of the same failure.
    ///
    /// `Error` is not `Clone` because of the wrapped [`std::io::Error`]; the
    /// copy of an `Io` error keeps its kind and message.
    pub fn replicate(&self) -> Self {
        match self {
            Error::NotFound { entity, id } => Error::NotFound {
                entity: entity.clone(),
                id: id.clone(),
            },
            Error::Unauthorized(m) => Error::Unauthorized(m.clone()),
            Error::Validation(m) => Error::Validation(m.clone()),
            Error::InvalidRange { size } => Error::InvalidRange { size: *size },
            Error::Io { source } => Error::Io {
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Error::ToolUnavailable { tool } => Error::ToolUnavailable { tool: tool.clone() },
            Error::Tool { tool, message } => Error::Tool {
                tool: tool.clone(),
                message: message.clone(),
            },
            Error::Timeout { tool, after } => Error::Timeout {
                tool: tool.clone(),
                after: *after,
            },
            Error::Probe(m) => Error::Probe(m.clone()),
            Error::Generation { kind, message } => Error::Generation {
                kind: kind.clone(),
                message: message.clone(),
            },
            Error::Internal(m) => Error::Internal(m.clone()),
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ToolUnavailable`].
    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Error::ToolUnavailable { tool: tool.into() }
    }

    /// Convenience constructor for [`Error::Generation`].
    pub fn generation(kind: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Generation {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
