//! Builder for executing external tool commands with a time budget.
//!
//! Children are spawned with `kill_on_drop`, so a timed-out or abandoned
//! invocation never leaves a running process behind.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Minimum interval between logged progress lines of one process.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Number of non-progress stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a successful tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Tail of standard error with progress lines removed.
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// ```no_run
/// use flix_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> flix_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and the stderr tail.
    ///
    /// # Errors
    ///
    /// - [`flix_core::Error::ToolUnavailable`] if the binary does not exist.
    /// - [`flix_core::Error::Timeout`] if the budget expires; the child is killed.
    /// - [`flix_core::Error::Tool`] on a non-zero exit (message carries the
    ///   stderr tail) or any other spawn/wait failure.
    pub async fn execute(&self) -> flix_core::Result<ToolOutput> {
        let tool = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!(tool = %tool, args = ?self.args, "Spawning");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                flix_core::Error::tool_unavailable(tool.clone())
            } else {
                flix_core::Error::tool(tool.clone(), format!("failed to spawn: {e}"))
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (out, tail, status) = tokio::join!(
                read_all(stdout),
                collect_stderr(stderr, &tool),
                child.wait()
            );
            (out, tail, status)
        };

        let outcome = tokio::time::timeout(self.timeout, run).await;
        let (out, tail, status) = match outcome {
            Ok(result) => result,
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(tool = %tool, "Failed to kill timed-out process: {e}");
                }
                tracing::warn!(tool = %tool, after = ?self.timeout, "Process timed out");
                return Err(flix_core::Error::Timeout {
                    tool,
                    after: self.timeout,
                });
            }
        };

        let status = status
            .map_err(|e| flix_core::Error::tool(tool.clone(), format!("wait failed: {e}")))?;
        let stderr = tail.into_iter().collect::<Vec<_>>().join("\n");

        if !status.success() {
            return Err(flix_core::Error::tool(
                tool,
                format!("exited with {status}: {}", stderr.trim()),
            ));
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&out).to_string(),
            stderr,
        })
    }
}

async fn read_all(pipe: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!("stdout read failed: {e}");
        }
    }
    buf
}

/// Drain stderr, logging progress lines at most every
/// [`PROGRESS_LOG_INTERVAL`] and keeping the last other lines.
///
/// ffmpeg terminates its progress lines with `\r`, so both `\r` and `\n`
/// split lines.
async fn collect_stderr(pipe: Option<impl AsyncRead + Unpin>, tool: &str) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let Some(mut pipe) = pipe else {
        return tail;
    };

    let mut throttle = ProgressThrottle::new(PROGRESS_LOG_INTERVAL);
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(tool, "stderr read failed: {e}");
                break;
            }
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(pos) = pending.iter().position(|&b| b == b'\n' || b == b'\r') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            handle_line(&line[..line.len() - 1], tool, &mut throttle, &mut tail);
        }
    }
    if !pending.is_empty() {
        handle_line(&pending, tool, &mut throttle, &mut tail);
    }
    tail
}

fn handle_line(
    raw: &[u8],
    tool: &str,
    throttle: &mut ProgressThrottle,
    tail: &mut VecDeque<String>,
) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if is_progress_line(line) {
        if throttle.ready(Instant::now()) {
            tracing::debug!(tool, progress = %line, "Progress");
        }
        return;
    }

    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

fn is_progress_line(line: &str) -> bool {
    line.starts_with("frame=") || line.starts_with("size=")
}

/// Rate limiter for progress logging.
#[derive(Debug)]
struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
