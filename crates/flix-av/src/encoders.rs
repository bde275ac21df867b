//! H.264 encoder selection.
//!
//! `ffmpeg -hide_banner -encoders` is queried at most once per
//! [`EncoderSelector`]; the server holds a single selector for its lifetime.
//! Priority: NVENC, then the platform encoder (QSV on Windows, VAAPI then
//! VideoToolbox elsewhere), then libx264.

use std::fmt;
use std::time::Duration;

use flix_core::config::MediaConfig;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::runner::{Invocation, ToolRunner};
use crate::tools::Tool;

/// A video encoder the rendition builder can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoder {
    Nvenc,
    Qsv,
    Vaapi,
    VideoToolbox,
    Software,
}

impl VideoEncoder {
    /// ffmpeg encoder name.
    pub fn codec_name(self) -> &'static str {
        match self {
            VideoEncoder::Nvenc => "h264_nvenc",
            VideoEncoder::Qsv => "h264_qsv",
            VideoEncoder::Vaapi => "h264_vaapi",
            VideoEncoder::VideoToolbox => "h264_videotoolbox",
            VideoEncoder::Software => "libx264",
        }
    }

    pub fn is_hardware(self) -> bool {
        self != VideoEncoder::Software
    }

    /// Arguments that must precede `-i`.
    pub fn input_args(self) -> Vec<String> {
        match self {
            VideoEncoder::Vaapi => ["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi"]
                .map(String::from)
                .to_vec(),
            _ => Vec::new(),
        }
    }

    /// `-c:v` and its tuning arguments.
    pub fn output_args(self, media: &MediaConfig) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec_name().to_string()];
        match self {
            VideoEncoder::Nvenc => args.extend(["-preset".into(), "p4".into()]),
            VideoEncoder::Qsv => args.extend(["-preset".into(), "medium".into()]),
            VideoEncoder::Vaapi | VideoEncoder::VideoToolbox => {}
            VideoEncoder::Software => args.extend([
                "-preset".into(),
                media.software_preset.clone(),
                "-crf".into(),
                media.software_crf.to_string(),
            ]),
        }
        args
    }

    /// Map a configured `media.hw_accel` value. `auto` (and unknown values)
    /// return `None`, meaning "detect".
    pub fn from_override(value: &str) -> Option<Self> {
        match value {
            "none" | "software" => Some(VideoEncoder::Software),
            "nvenc" => Some(VideoEncoder::Nvenc),
            "qsv" => Some(VideoEncoder::Qsv),
            "vaapi" => Some(VideoEncoder::Vaapi),
            "videotoolbox" => Some(VideoEncoder::VideoToolbox),
            _ => None,
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec_name())
    }
}

/// Pick the best encoder listed in `ffmpeg -encoders` output.
pub fn select_from_list(encoder_list: &str, windows: bool) -> VideoEncoder {
    let listed = |enc: VideoEncoder| {
        encoder_list
            .split_whitespace()
            .any(|token| token == enc.codec_name())
    };

    let platform: &[VideoEncoder] = if windows {
        &[VideoEncoder::Qsv]
    } else {
        &[VideoEncoder::Vaapi, VideoEncoder::VideoToolbox]
    };

    std::iter::once(VideoEncoder::Nvenc)
        .chain(platform.iter().copied())
        .find(|&enc| listed(enc))
        .unwrap_or(VideoEncoder::Software)
}

/// Lazily detects and then remembers the encoder to use.
#[derive(Debug, Default)]
pub struct EncoderSelector {
    selected: OnceCell<VideoEncoder>,
}

impl EncoderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The encoder, if one has been selected already.
    pub fn current(&self) -> Option<VideoEncoder> {
        self.selected.get().copied()
    }

    /// Select the encoder, detecting on first use. Detection failure is not
    /// an error: software encoding is selected.
    pub async fn select(
        &self,
        runner: &dyn ToolRunner,
        media: &MediaConfig,
        timeout: Duration,
    ) -> VideoEncoder {
        *self
            .selected
            .get_or_init(|| async {
                if let Some(forced) = VideoEncoder::from_override(&media.hw_accel) {
                    tracing::info!(encoder = %forced, "Using configured video encoder");
                    return forced;
                }
                detect(runner, timeout).await
            })
            .await
    }
}

async fn detect(runner: &dyn ToolRunner, timeout: Duration) -> VideoEncoder {
    let invocation = Invocation::new(Tool::Ffmpeg, timeout).args(["-hide_banner", "-encoders"]);
    match runner.run(invocation).await {
        Ok(output) => {
            let encoder = select_from_list(&output.stdout, cfg!(windows));
            if encoder.is_hardware() {
                tracing::info!(encoder = %encoder, "Hardware video encoder detected");
            } else {
                tracing::info!("No hardware encoder available; using software encoding");
            }
            encoder
        }
        Err(e) => {
            tracing::warn!("Encoder detection failed, falling back to software: {e}");
            VideoEncoder::Software
        }
    }
}
