//! Scripted [`ToolRunner`] for tests.
//!
//! [`ScriptedRunner`] records every invocation and fakes what ffmpeg and
//! ffprobe would produce: probe JSON on stdout, an encoder list, a JPEG or
//! WebVTT file at the output path, or a playlist plus one segment for HLS
//! runs. Individual invocations can be scripted to fail, time out, or exit
//! cleanly without output.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::ToolOutput;
use crate::runner::{Invocation, ToolRunner};
use crate::tools::Tool;

type Predicate = Arc<dyn Fn(&Invocation) -> bool + Send + Sync>;

/// Probe output describing one video, two audio and no subtitle streams.
pub const DEFAULT_PROBE_JSON: &str = r#"{
    "streams": [
        {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
        {"index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2, "tags": {"language": "eng"}},
        {"index": 2, "codec_type": "audio", "codec_name": "ac3", "channels": 6}
    ],
    "format": {"format_name": "matroska,webm", "duration": "120.0"}
}"#;

/// Fake bytes written for image outputs.
pub const FAKE_JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg";

#[derive(Clone, Copy)]
enum Outcome {
    Fail,
    Timeout,
    NoOutput,
}

/// Test double for external tools.
#[derive(Clone)]
pub struct ScriptedRunner {
    inner: Arc<Inner>,
}

struct Inner {
    probe_json: Mutex<String>,
    encoder_list: Mutex<String>,
    delay: Mutex<Duration>,
    unavailable: Mutex<HashSet<Tool>>,
    rules: Mutex<Vec<(Predicate, Outcome)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                probe_json: Mutex::new(DEFAULT_PROBE_JSON.to_string()),
                encoder_list: Mutex::new(" V....D libx264  libx264 H.264\n".to_string()),
                delay: Mutex::new(Duration::ZERO),
                unavailable: Mutex::new(HashSet::new()),
                rules: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Stdout returned for every ffprobe run.
    pub fn with_probe_json(self, json: impl Into<String>) -> Self {
        *self.inner.probe_json.lock() = json.into();
        self
    }

    /// Stdout returned for `ffmpeg -encoders`.
    pub fn with_encoder_list(self, list: impl Into<String>) -> Self {
        *self.inner.encoder_list.lock() = list.into();
        self
    }

    /// Sleep this long inside every invocation.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock() = delay;
        self
    }

    /// Report `tool` as not installed.
    pub fn without_tool(self, tool: Tool) -> Self {
        self.inner.unavailable.lock().insert(tool);
        self
    }

    /// Matching invocations exit non-zero.
    pub fn fail_when(self, pred: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
        self.push_rule(Arc::new(pred), Outcome::Fail)
    }

    /// Matching invocations exceed their timeout.
    pub fn timeout_when(self, pred: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
        self.push_rule(Arc::new(pred), Outcome::Timeout)
    }

    /// Matching invocations exit 0 but write nothing.
    pub fn no_output_when(
        self,
        pred: impl Fn(&Invocation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.push_rule(Arc::new(pred), Outcome::NoOutput)
    }

    fn push_rule(self, pred: Predicate, outcome: Outcome) -> Self {
        self.inner.rules.lock().push((pred, outcome));
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.inner.calls.lock().clone()
    }

    /// Number of invocations matching `pred`.
    pub fn count(&self, pred: impl Fn(&Invocation) -> bool) -> usize {
        self.inner.calls.lock().iter().filter(|i| pred(i)).count()
    }

    fn outcome_for(&self, invocation: &Invocation) -> Option<Outcome> {
        self.inner
            .rules
            .lock()
            .iter()
            .find(|(pred, _)| pred(invocation))
            .map(|(_, outcome)| *outcome)
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// True for HLS rendition runs.
pub fn is_hls(inv: &Invocation) -> bool {
    inv.flag_value("-f") == Some("hls")
}

/// True for WebVTT extraction of stream `index`.
pub fn is_subtitle_extraction(index: u32) -> impl Fn(&Invocation) -> bool + Send + Sync + 'static {
    let map = format!("0:{index}");
    move |inv| {
        inv.flag_value("-c:s") == Some("webvtt") && inv.flag_value("-map") == Some(map.as_str())
    }
}

/// True for any single-frame extraction.
pub fn is_frame(inv: &Invocation) -> bool {
    inv.flag_value("-vframes") == Some("1")
}

/// True for single-frame extractions that scale (the primary attempt).
pub fn is_scaled_frame(inv: &Invocation) -> bool {
    is_frame(inv) && inv.flag_value("-vf").is_some()
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> flix_core::Result<ToolOutput> {
        self.inner.calls.lock().push(invocation.clone());

        if !self.is_available(invocation.tool) {
            return Err(flix_core::Error::tool_unavailable(invocation.tool.name()));
        }

        let delay = *self.inner.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.outcome_for(&invocation) {
            Some(Outcome::Fail) => {
                return Err(flix_core::Error::tool(
                    invocation.tool.name(),
                    "exited with exit status: 1: scripted failure",
                ))
            }
            Some(Outcome::Timeout) => {
                return Err(flix_core::Error::Timeout {
                    tool: invocation.tool.name().to_string(),
                    after: invocation.timeout,
                })
            }
            Some(Outcome::NoOutput) => return Ok(ToolOutput::default()),
            None => {}
        }

        match invocation.tool {
            Tool::Ffprobe => Ok(ToolOutput {
                stdout: self.inner.probe_json.lock().clone(),
                stderr: String::new(),
            }),
            Tool::Ffmpeg if invocation.args.iter().any(|a| a == "-encoders") => Ok(ToolOutput {
                stdout: self.inner.encoder_list.lock().clone(),
                stderr: String::new(),
            }),
            Tool::Ffmpeg => {
                write_fake_outputs(&invocation)?;
                Ok(ToolOutput::default())
            }
        }
    }

    fn is_available(&self, tool: Tool) -> bool {
        !self.inner.unavailable.lock().contains(&tool)
    }
}

fn write_fake_outputs(inv: &Invocation) -> flix_core::Result<()> {
    let Some(output) = inv.output_arg().map(PathBuf::from) else {
        return Ok(());
    };

    if is_hls(inv) {
        if let Some(pattern) = inv.flag_value("-hls_segment_filename") {
            let first = pattern.replace("%03d", "000");
            write(Path::new(&first), b"fake-ts")?;
        }
        let playlist = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n\
                        #EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:4.0,\nsegment000.ts\n#EXT-X-ENDLIST\n";
        return write(&output, playlist.as_bytes());
    }

    match output.extension().and_then(|e| e.to_str()) {
        Some("vtt") => write(&output, b"WEBVTT\n\n00:00.000 --> 00:01.000\nhello\n"),
        Some("jpg") | Some("jpeg") => write(&output, FAKE_JPEG),
        _ => write(&output, b"fake"),
    }
}

fn write(path: &Path, bytes: &[u8]) -> flix_core::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
