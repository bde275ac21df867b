//! Single-rendition HLS output.
//!
//! One H.264 video stream, every audio track transcoded to AAC in its own
//! slot, MPEG-TS segments, a VOD playlist, one WebVTT file per subtitle track
//! and a `variants.json` describing the track layout. Everything is built in
//! a staging directory that replaces `output_dir` only on success, so a
//! directory with a playlist is always complete.

use std::path::{Path, PathBuf};
use std::time::Duration;

use flix_core::artifact::{subtitle_file_name, PLAYLIST_NAME, VARIANTS_NAME};
use flix_core::config::MediaConfig;
use flix_core::{ArtifactKind, MediaMetadata, VariantsManifest};

use crate::attempt::Attempt;
use crate::encoders::VideoEncoder;
use crate::runner::{Invocation, ToolRunner};
use crate::staging::Staging;
use crate::tools::Tool;

/// Segment file pattern passed to ffmpeg.
const SEGMENT_PATTERN: &str = "segment%03d.ts";

/// Settings for one rendition build.
#[derive(Debug, Clone)]
pub struct RenditionOptions {
    pub media: MediaConfig,
    pub encoder: VideoEncoder,
    pub timeout: Duration,
    pub subtitle_timeout: Duration,
}

/// Summary of a completed rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct RenditionReport {
    pub playlist: PathBuf,
    pub encoder: VideoEncoder,
    pub audio_tracks: usize,
    /// Subtitle stream indices written as WebVTT.
    pub subtitles_extracted: Vec<u32>,
    /// Subtitle stream indices whose extraction failed.
    pub subtitles_failed: Vec<u32>,
}

/// ffmpeg arguments extracting subtitle stream `index` to `output`.
pub fn subtitle_invocation(source: &Path, index: u32, output: &Path, timeout: Duration) -> Invocation {
    Invocation::new(Tool::Ffmpeg, timeout)
        .arg("-hide_banner")
        .arg("-i")
        .arg(source.to_string_lossy())
        .args(["-map".to_string(), format!("0:{index}")])
        .args(["-c:s", "webvtt", "-y"])
        .arg(output.to_string_lossy())
}

/// ffmpeg arguments for the HLS run writing into `dir`.
pub fn hls_invocation(
    source: &Path,
    metadata: Option<&MediaMetadata>,
    dir: &Path,
    opts: &RenditionOptions,
) -> Invocation {
    let media = &opts.media;
    let mut inv = Invocation::new(Tool::Ffmpeg, opts.timeout)
        .args(["-hide_banner", "-err_detect", "ignore_err"])
        .args(opts.encoder.input_args())
        .arg("-i")
        .arg(source.to_string_lossy())
        .args(["-map", "0:v:0?"]);

    let audio = metadata.map(|m| m.audio_streams.as_slice()).unwrap_or_default();
    if audio.is_empty() {
        inv = inv
            .args(["-map", "0:a?"])
            .args(opts.encoder.output_args(media))
            .args(["-c:a", "aac", "-b:a"])
            .arg(media.audio_bitrate.clone());
    } else {
        for track in audio {
            inv = inv.args(["-map".to_string(), format!("0:{}", track.index)]);
        }
        inv = inv.args(opts.encoder.output_args(media));
        for slot in 0..audio.len() {
            inv = inv.args([
                format!("-c:a:{slot}"),
                "aac".to_string(),
                format!("-b:a:{slot}"),
                media.audio_bitrate.clone(),
            ]);
        }
    }

    inv.args(["-f", "hls"])
        .args(["-hls_time".to_string(), media.segment_secs.to_string()])
        .args(["-hls_list_size", "0"])
        .args(["-hls_segment_type", "mpegts"])
        .args(["-hls_playlist_type", "vod"])
        .args(["-hls_flags", "independent_segments"])
        .arg("-hls_segment_filename")
        .arg(dir.join(SEGMENT_PATTERN).to_string_lossy())
        .arg("-y")
        .arg(dir.join(PLAYLIST_NAME).to_string_lossy())
}

/// Build the rendition of `source` into `output_dir`.
///
/// Subtitle extraction failures are logged and tolerated. A failed or
/// timed-out HLS run removes everything written and returns the error.
pub async fn build_rendition(
    runner: &dyn ToolRunner,
    source: &Path,
    metadata: Option<&MediaMetadata>,
    output_dir: &Path,
    opts: &RenditionOptions,
) -> flix_core::Result<RenditionReport> {
    let staging = Staging::for_target(output_dir)?;
    let dir = staging.path();

    let mut extracted = Vec::new();
    let mut failed = Vec::new();
    for sub in metadata.map(|m| m.subtitle_streams.as_slice()).unwrap_or_default() {
        let out = dir.join(subtitle_file_name(sub.index));
        let inv = subtitle_invocation(source, sub.index, &out, opts.subtitle_timeout);
        match runner.run(inv).await {
            Ok(_) if out.is_file() => extracted.push(sub.index),
            Ok(_) => {
                tracing::warn!(index = sub.index, "Subtitle extraction wrote nothing");
                failed.push(sub.index);
            }
            Err(e) => {
                tracing::warn!(index = sub.index, source = %source.display(), "Subtitle extraction failed: {e}");
                failed.push(sub.index);
            }
        }
    }

    let mut attempt = Attempt::new("rendition");
    attempt.start()?;
    tracing::info!(
        source = %source.display(),
        encoder = %opts.encoder,
        "Building HLS rendition"
    );

    let run = runner.run(hls_invocation(source, metadata, dir, opts)).await;
    let playlist = dir.join(PLAYLIST_NAME);
    match run {
        Ok(_) if playlist.is_file() => attempt.succeed()?,
        Ok(_) => {
            attempt.fail("no playlist written")?;
            return Err(flix_core::Error::generation(
                ArtifactKind::Rendition,
                "ffmpeg exited without writing a playlist",
            ));
        }
        Err(e) => {
            tracing::error!(source = %source.display(), "HLS run failed: {e}");
            attempt.fail(e.to_string())?;
            // Staging drops here, removing partial segments.
            return Err(e);
        }
    }

    let manifest = VariantsManifest::from_metadata(&metadata.cloned().unwrap_or_default());
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| {
        flix_core::Error::generation(ArtifactKind::Rendition, format!("variants.json: {e}"))
    })?;
    std::fs::write(dir.join(VARIANTS_NAME), json)?;

    let committed = staging.commit_dir()?;
    let report = RenditionReport {
        playlist: committed.join(PLAYLIST_NAME),
        encoder: opts.encoder,
        audio_tracks: metadata.map(|m| m.audio_streams.len()).unwrap_or(0),
        subtitles_extracted: extracted,
        subtitles_failed: failed,
    };
    tracing::info!(
        playlist = %report.playlist.display(),
        subtitles = report.subtitles_extracted.len(),
        subtitles_failed = report.subtitles_failed.len(),
        "Rendition complete"
    );
    Ok(report)
}
