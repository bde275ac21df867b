//! Seek-preview frames spread evenly across a video.

use std::path::{Path, PathBuf};

use flix_core::artifact::preview_file_name;

use crate::runner::ToolRunner;
use crate::thumbnail::{generate_thumbnail, FrameOptions};

/// Seek times of `count` previews over `duration_seconds`: `i * d / count`.
pub fn preview_times(duration_seconds: f64, count: u32) -> Vec<f64> {
    if duration_seconds <= 0.0 || count == 0 {
        return Vec::new();
    }
    (0..count)
        .map(|i| f64::from(i) * duration_seconds / f64::from(count))
        .collect()
}

/// Write `count` preview JPEGs into `output_dir`.
///
/// Frames that fail are logged and skipped, so the result may be a partial
/// set. Returns the written paths in index order; empty when the duration is
/// unknown.
pub async fn generate_previews(
    runner: &dyn ToolRunner,
    source: &Path,
    duration_seconds: f64,
    count: u32,
    output_dir: &Path,
    frame: &FrameOptions,
) -> Vec<PathBuf> {
    let times = preview_times(duration_seconds, count);
    if times.is_empty() {
        tracing::debug!(source = %source.display(), "No duration; skipping previews");
        return Vec::new();
    }

    // Each preview falls back to its own timestamp.
    let frame = FrameOptions {
        fallback_seek_secs: None,
        ..frame.clone()
    };

    let mut written = Vec::with_capacity(times.len());
    for (i, seek) in (0u32..).zip(times) {
        let output = output_dir.join(preview_file_name(i));
        if generate_thumbnail(runner, source, seek, &output, &frame).await {
            written.push(output);
        } else {
            tracing::warn!(source = %source.display(), index = i, "Preview frame skipped");
        }
    }

    tracing::info!(
        source = %source.display(),
        written = written.len(),
        requested = count,
        "Previews generated"
    );
    written
}
