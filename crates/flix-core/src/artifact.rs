//! On-disk layout of derived artifacts.
//!
//! Presence on disk is the only record of an artifact: there is no index. Each
//! [`ArtifactKind`] has a marker path whose existence means "done".

use std::fmt;
use std::path::{Path, PathBuf};

use crate::key::MediaKey;

/// Name of the HLS playlist inside a rendition directory.
pub const PLAYLIST_NAME: &str = "master.m3u8";
/// Name of the track manifest inside a rendition directory.
pub const VARIANTS_NAME: &str = "variants.json";

/// Kinds of derived artifacts kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Thumbnail,
    Previews,
    Metadata,
    Rendition,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Thumbnail,
        ArtifactKind::Previews,
        ArtifactKind::Metadata,
        ArtifactKind::Rendition,
    ];

    /// Subdirectory of the cache root holding this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Thumbnail => "thumbnails",
            ArtifactKind::Previews => "previews",
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Rendition => "hls",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Thumbnail => "thumbnail",
            ArtifactKind::Previews => "previews",
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Rendition => "rendition",
        };
        f.write_str(s)
    }
}

/// Path arithmetic for the cache tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the per-kind subdirectories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for kind in ArtifactKind::ALL {
            std::fs::create_dir_all(self.root.join(kind.dir_name()))?;
        }
        Ok(())
    }

    pub fn thumbnail(&self, key: &MediaKey) -> PathBuf {
        self.root
            .join(ArtifactKind::Thumbnail.dir_name())
            .join(format!("{key}.jpg"))
    }

    pub fn metadata(&self, key: &MediaKey) -> PathBuf {
        self.root
            .join(ArtifactKind::Metadata.dir_name())
            .join(format!("{key}.json"))
    }

    pub fn rendition_dir(&self, key: &MediaKey) -> PathBuf {
        self.root
            .join(ArtifactKind::Rendition.dir_name())
            .join(key.as_str())
    }

    pub fn playlist(&self, key: &MediaKey) -> PathBuf {
        self.rendition_dir(key).join(PLAYLIST_NAME)
    }

    pub fn previews_dir(&self, key: &MediaKey) -> PathBuf {
        self.root
            .join(ArtifactKind::Previews.dir_name())
            .join(key.as_str())
    }

    /// The path whose existence marks `kind` as complete for `key`.
    pub fn marker(&self, kind: ArtifactKind, key: &MediaKey) -> PathBuf {
        match kind {
            ArtifactKind::Thumbnail => self.thumbnail(key),
            ArtifactKind::Metadata => self.metadata(key),
            ArtifactKind::Rendition => self.playlist(key),
            ArtifactKind::Previews => self.previews_dir(key),
        }
    }

    /// True when the marker of `kind` exists.
    pub fn is_present(&self, kind: ArtifactKind, key: &MediaKey) -> bool {
        self.marker(kind, key).exists()
    }
}

/// File name of the preview frame at `index` (`preview_007.jpg`).
pub fn preview_file_name(index: u32) -> String {
    format!("preview_{index:03}.jpg")
}

/// File name of the WebVTT file extracted from stream `index`.
pub fn subtitle_file_name(index: u32) -> String {
    format!("subtitle_{index}.vtt")
}
