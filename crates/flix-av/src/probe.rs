//! Media inspection via `ffprobe`.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams` and
//! maps the JSON into [`MediaMetadata`], filling defaults so no descriptor
//! field is ever empty.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use flix_core::media::{DEFAULT_CHANNELS, UNDETERMINED_LANGUAGE};
use flix_core::{MediaMetadata, StreamDescriptor, StreamKind};
use serde::Deserialize;

use crate::runner::{Invocation, ToolRunner};
use crate::tools::Tool;

/// Build the ffprobe invocation for `path`.
pub fn probe_invocation(path: &Path, timeout: Duration) -> Invocation {
    Invocation::new(Tool::Ffprobe, timeout)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path.to_string_lossy())
}

/// Inspect `path` and return its metadata.
///
/// On any error no metadata is produced; callers may still stream the raw
/// file.
pub async fn probe(
    runner: &dyn ToolRunner,
    path: &Path,
    timeout: Duration,
) -> flix_core::Result<MediaMetadata> {
    let output = runner.run(probe_invocation(path, timeout)).await?;
    let metadata = parse_ffprobe_json(&output.stdout)?;
    tracing::debug!(
        path = %path.display(),
        audio = metadata.audio_streams.len(),
        subtitles = metadata.subtitle_streams.len(),
        duration = metadata.duration_seconds(),
        "Probed"
    );
    Ok(metadata)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse ffprobe JSON output into [`MediaMetadata`].
pub fn parse_ffprobe_json(json: &str) -> flix_core::Result<MediaMetadata> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| flix_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;
    Ok(build_metadata(output))
}

fn build_metadata(output: FfprobeOutput) -> MediaMetadata {
    let container_duration = output
        .format
        .get("duration")
        .and_then(|v| match v {
            serde_json::Value::String(s) => s.parse::<f64>().ok(),
            serde_json::Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .unwrap_or(0.0);

    let mut video_info = None;
    let mut audio_streams = Vec::new();
    let mut subtitle_streams = Vec::new();

    for stream in output.streams {
        let kind = match stream.codec_type.as_deref() {
            Some("video") => StreamKind::Video,
            Some("audio") => StreamKind::Audio,
            Some("subtitle") => StreamKind::Subtitle,
            _ => continue,
        };

        let ordinal = match kind {
            StreamKind::Video => 1,
            StreamKind::Audio => audio_streams.len() + 1,
            StreamKind::Subtitle => subtitle_streams.len() + 1,
        };
        let descriptor = describe(stream, kind, ordinal, container_duration);

        match kind {
            // Cover art shows up as an extra video stream; the first wins.
            StreamKind::Video => {
                if video_info.is_none() {
                    video_info = Some(descriptor);
                }
            }
            StreamKind::Audio => audio_streams.push(descriptor),
            StreamKind::Subtitle => subtitle_streams.push(descriptor),
        }
    }

    MediaMetadata {
        video_info,
        audio_streams,
        subtitle_streams,
        container_duration_seconds: container_duration,
        raw_format_fields: output.format.into_iter().collect::<BTreeMap<_, _>>(),
    }
}

fn describe(
    stream: FfprobeStream,
    kind: StreamKind,
    ordinal: usize,
    container_duration: f64,
) -> StreamDescriptor {
    let language = non_empty(stream.tags.language)
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string());
    let title = non_empty(stream.tags.title).unwrap_or_else(|| match kind {
        StreamKind::Video => "Video Track".to_string(),
        StreamKind::Audio => format!("Audio Track {ordinal}"),
        StreamKind::Subtitle => format!("Subtitle Track {ordinal}"),
    });
    let duration_seconds = stream
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .unwrap_or(container_duration);

    StreamDescriptor {
        index: stream.index,
        kind,
        codec: non_empty(stream.codec_name).unwrap_or_else(|| "unknown".to_string()),
        language,
        title,
        channels: match kind {
            StreamKind::Audio => Some(stream.channels.unwrap_or(DEFAULT_CHANNELS)),
            _ => None,
        },
        width: if kind == StreamKind::Video { stream.width } else { None },
        height: if kind == StreamKind::Video { stream.height } else { None },
        duration_seconds,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}
