//! Media model: probed stream descriptors, persisted metadata, the variants
//! manifest consumed by the player, and file classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Language tag used when a stream carries none.
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Channel count assumed for audio streams that do not report one.
pub const DEFAULT_CHANNELS: u32 = 2;

/// Elementary stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// One elementary stream of a container, as reported by the inspector.
///
/// `index` is the container-level stream index, used verbatim in
/// `-map 0:<index>` arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub index: u32,
    pub kind: StreamKind,
    pub codec: String,
    pub language: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub duration_seconds: f64,
}

/// Everything the pipeline needs to know about a source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub video_info: Option<StreamDescriptor>,
    #[serde(default)]
    pub audio_streams: Vec<StreamDescriptor>,
    #[serde(default)]
    pub subtitle_streams: Vec<StreamDescriptor>,
    #[serde(default)]
    pub container_duration_seconds: f64,
    #[serde(default)]
    pub raw_format_fields: BTreeMap<String, serde_json::Value>,
}

impl MediaMetadata {
    /// Best known duration: container first, then the video stream, else 0.
    pub fn duration_seconds(&self) -> f64 {
        if self.container_duration_seconds > 0.0 {
            return self.container_duration_seconds;
        }
        self.video_info
            .as_ref()
            .map(|v| v.duration_seconds)
            .filter(|d| *d > 0.0)
            .unwrap_or(0.0)
    }

    pub fn has_video(&self) -> bool {
        self.video_info.is_some()
    }
}

// ---------------------------------------------------------------------------
// Variants manifest
// ---------------------------------------------------------------------------

/// Track layout written as `variants.json` next to the playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantsManifest {
    pub video: VideoVariant,
    pub audio_streams: Vec<AudioVariant>,
    pub subtitle_streams: Vec<SubtitleVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoVariant {
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioVariant {
    pub index: u32,
    pub language: String,
    pub title: String,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleVariant {
    pub index: u32,
    pub language: String,
    pub title: String,
}

impl VariantsManifest {
    /// Describe every track of `metadata`, whether or not its extraction
    /// later succeeds.
    pub fn from_metadata(metadata: &MediaMetadata) -> Self {
        let video = match &metadata.video_info {
            Some(v) => VideoVariant {
                index: v.index,
                name: v.title.clone(),
            },
            None => VideoVariant {
                index: 0,
                name: "Video Track".into(),
            },
        };

        Self {
            video,
            audio_streams: metadata
                .audio_streams
                .iter()
                .map(|a| AudioVariant {
                    index: a.index,
                    language: a.language.clone(),
                    title: a.title.clone(),
                    channels: a.channels.unwrap_or(DEFAULT_CHANNELS),
                })
                .collect(),
            subtitle_streams: metadata
                .subtitle_streams
                .iter()
                .map(|s| SubtitleVariant {
                    index: s.index,
                    language: s.language.clone(),
                    title: s.title.clone(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// File classification
// ---------------------------------------------------------------------------

/// Coarse classification of a library file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Audio,
    Image,
    Document,
    Other,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "wmv", "flv", "webm", "m4v", "ts"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "xlsx", "pptx"];

impl FileKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileKind::Other;
        };
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();

        if VIDEO_EXTENSIONS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            FileKind::Document
        } else {
            FileKind::Other
        }
    }

    pub fn is_video(self) -> bool {
        self == FileKind::Video
    }
}
