//! Single-frame JPEG extraction with one fallback attempt.
//!
//! The primary attempt seeks, maps the first video stream and scales; the
//! fallback drops the scale filter and stream mapping. Output is staged next
//! to the destination and renamed into place, so a half-written JPEG is
//! never visible.

use std::path::Path;
use std::time::Duration;

use crate::attempt::Attempt;
use crate::runner::{Invocation, ToolRunner};
use crate::staging::Staging;
use crate::tools::Tool;

/// File name used for the frame inside a staging area.
const STAGED_NAME: &str = "frame.jpg";

/// Parameters of a frame extraction.
#[derive(Debug, Clone)]
pub struct FrameOptions {
    /// Target width; height follows the aspect ratio.
    pub width: u32,
    /// JPEG quality (`-q:v`).
    pub quality: u32,
    /// Seek of the fallback attempt. `None` reuses the primary seek.
    pub fallback_seek_secs: Option<f64>,
    pub timeout: Duration,
}

/// Seek position for a poster frame: `configured`, unless the file is known
/// to be shorter, in which case the middle of the file.
pub fn poster_seek(configured: f64, duration_seconds: f64) -> f64 {
    if duration_seconds > 0.0 && duration_seconds <= configured {
        duration_seconds / 2.0
    } else {
        configured
    }
}

pub(crate) fn primary_invocation(
    source: &Path,
    seek_secs: f64,
    output: &Path,
    opts: &FrameOptions,
) -> Invocation {
    Invocation::new(Tool::Ffmpeg, opts.timeout)
        .args(["-hide_banner", "-err_detect", "ignore_err"])
        .args(["-ss".to_string(), format_seek(seek_secs)])
        .arg("-i")
        .arg(source.to_string_lossy())
        .args(["-map", "0:v:0?", "-vframes", "1"])
        .args(["-vf".to_string(), format!("scale={}:-1", opts.width)])
        .args(["-q:v".to_string(), opts.quality.to_string()])
        .arg("-y")
        .arg(output.to_string_lossy())
}

pub(crate) fn fallback_invocation(
    source: &Path,
    seek_secs: f64,
    output: &Path,
    opts: &FrameOptions,
) -> Invocation {
    Invocation::new(Tool::Ffmpeg, opts.timeout)
        .arg("-hide_banner")
        .args(["-ss".to_string(), format_seek(seek_secs)])
        .arg("-i")
        .arg(source.to_string_lossy())
        .args(["-vframes", "1", "-y"])
        .arg(output.to_string_lossy())
}

fn format_seek(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// Extract one frame of `source` at `seek_secs` into `output`.
///
/// Returns `false` when both attempts fail; nothing is left at `output`.
pub async fn generate_thumbnail(
    runner: &dyn ToolRunner,
    source: &Path,
    seek_secs: f64,
    output: &Path,
    opts: &FrameOptions,
) -> bool {
    let staging = match Staging::for_target(output) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(output = %output.display(), "Cannot stage thumbnail: {e}");
            return false;
        }
    };
    let staged = staging.path_for(STAGED_NAME);

    match extract(runner, source, seek_secs, &staged, opts).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            tracing::error!(source = %source.display(), "Frame extraction aborted: {e}");
            return false;
        }
    }

    match staging.commit_file(STAGED_NAME) {
        Ok(path) => {
            tracing::debug!(output = %path.display(), "Frame written");
            true
        }
        Err(e) => {
            tracing::error!(output = %output.display(), "Failed to commit frame: {e}");
            false
        }
    }
}

/// Run the primary attempt and, if it fails, the fallback. `Ok(false)` means
/// both attempts failed.
async fn extract(
    runner: &dyn ToolRunner,
    source: &Path,
    seek_secs: f64,
    staged: &Path,
    opts: &FrameOptions,
) -> flix_core::Result<bool> {
    let mut attempt = Attempt::new("thumbnail");
    let fallback_seek = opts.fallback_seek_secs.unwrap_or(seek_secs);

    loop {
        attempt.start()?;

        let invocation = if attempt.is_fallback() {
            fallback_invocation(source, fallback_seek, staged, opts)
        } else {
            primary_invocation(source, seek_secs, staged, opts)
        };

        let reason = match runner.run(invocation).await {
            Ok(_) if has_content(staged) => None,
            Ok(_) => Some("no frame written".to_string()),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = reason else {
            attempt.succeed()?;
            return Ok(true);
        };
        tracing::warn!(
            source = %source.display(),
            fallback = attempt.is_fallback(),
            "Frame extraction failed: {reason}"
        );
        attempt.fail(reason)?;
        if !attempt.retry_fallback()? {
            return Ok(false);
        }
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
