//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, library, cache, tools, media generation and the
//! worker pool. Every section defaults sensibly so an empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    pub tools: ToolsConfig,
    pub media: MediaConfig,
    pub timeouts: TimeoutConfig,
    pub workers: WorkerConfig,
    pub watch: WatchConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.enabled && (self.auth.username.is_none() || self.auth.password.is_none()) {
            warnings.push("auth is enabled but username or password is missing".into());
        }

        if !self.library.root.is_dir() {
            warnings.push(format!(
                "library.root {} is not a directory",
                self.library.root.display()
            ));
        }

        if self.workers.pool_size == 0 {
            warnings.push("workers.pool_size is 0; using 1".into());
        }

        if self.media.preview_count == 0 {
            warnings.push("media.preview_count is 0; previews are disabled".into());
        }

        let valid = ["auto", "none", "nvenc", "qsv", "vaapi", "videotoolbox"];
        if !valid.contains(&self.media.hw_accel.as_str()) {
            warnings.push(format!(
                "media.hw_accel '{}' is not a recognized method (valid: {})",
                self.media.hw_accel,
                valid.join(", ")
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    /// Image served (with a 404 status) when a thumbnail is unavailable.
    pub fallback_thumbnail: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            static_dir: None,
            fallback_thumbnail: Some(PathBuf::from("static/images/fallback.jpg")),
        }
    }
}

/// HTTP Basic authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// The served directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Initial root; can be swapped at runtime.
    pub root: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// Derived-artifact cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Treat a metadata artifact older than its source file as absent.
    /// Off by default: artifacts are never invalidated once written.
    pub revalidate_on_mtime: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache"),
            revalidate_on_mtime: false,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Thumbnail, preview and rendition parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub thumbnail_width: u32,
    /// JPEG quality passed as `-q:v` (2 best, 31 worst).
    pub thumbnail_quality: u32,
    pub thumbnail_seek_secs: f64,
    pub thumbnail_fallback_seek_secs: f64,
    pub preview_count: u32,
    pub preview_width: u32,
    pub preview_quality: u32,
    pub segment_secs: u32,
    pub audio_bitrate: String,
    pub software_preset: String,
    pub software_crf: u32,
    /// Hardware acceleration method (auto, none, nvenc, qsv, vaapi,
    /// videotoolbox). `auto` queries ffmpeg's encoder list once per process.
    pub hw_accel: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: 480,
            thumbnail_quality: 3,
            thumbnail_seek_secs: 10.0,
            thumbnail_fallback_seek_secs: 5.0,
            preview_count: 10,
            preview_width: 160,
            preview_quality: 5,
            segment_secs: 4,
            audio_bitrate: "128k".into(),
            software_preset: "superfast".into(),
            software_crf: 26,
            hw_accel: "auto".into(),
        }
    }
}

/// Subprocess time budgets, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub probe_secs: u64,
    pub thumbnail_secs: u64,
    pub subtitle_secs: u64,
    pub rendition_secs: u64,
    pub encoder_query_secs: u64,
}

impl TimeoutConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn thumbnail(&self) -> Duration {
        Duration::from_secs(self.thumbnail_secs)
    }

    pub fn subtitle(&self) -> Duration {
        Duration::from_secs(self.subtitle_secs)
    }

    pub fn rendition(&self) -> Duration {
        Duration::from_secs(self.rendition_secs)
    }

    pub fn encoder_query(&self) -> Duration {
        Duration::from_secs(self.encoder_query_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_secs: 30,
            thumbnail_secs: 30,
            subtitle_secs: 300,
            rendition_secs: 1800,
            encoder_query_secs: 10,
        }
    }
}

/// Background worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            shutdown_grace_secs: 10,
        }
    }
}

/// File-system watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub settle_time_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_time_secs: 5,
        }
    }
}
