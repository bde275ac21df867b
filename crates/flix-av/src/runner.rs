//! The seam between generators and external processes.
//!
//! Generators describe what to run as an [`Invocation`] and hand it to a
//! [`ToolRunner`]. [`ProcessRunner`] spawns real processes; tests substitute
//! a scripted runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{ToolCommand, ToolOutput};
use crate::tools::{Tool, ToolRegistry};

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(tool: Tool, timeout: Duration) -> Self {
        Self {
            tool,
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// The last argument, which for ffmpeg is the output path.
    pub fn output_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Value following the first occurrence of `flag`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Executes tool invocations.
#[async_trait]
pub trait ToolRunner: Send + Sync + 'static {
    /// Run `invocation` to completion within its timeout.
    async fn run(&self, invocation: Invocation) -> flix_core::Result<ToolOutput>;

    /// Whether `tool` can be run at all.
    fn is_available(&self, tool: Tool) -> bool;
}

/// Shared handle to a runner.
pub type SharedRunner = Arc<dyn ToolRunner>;

/// Runs invocations as real child processes located via a [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    registry: ToolRegistry,
}

impl ProcessRunner {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: Invocation) -> flix_core::Result<ToolOutput> {
        let path = self.registry.require(invocation.tool)?;
        ToolCommand::new(path.to_path_buf())
            .args(invocation.args)
            .timeout(invocation.timeout)
            .execute()
            .await
    }

    fn is_available(&self, tool: Tool) -> bool {
        self.registry.is_available(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_helpers() {
        let inv = Invocation::new(Tool::Ffmpeg, Duration::from_secs(1))
            .args(["-ss", "10", "-i", "in.mkv"])
            .arg("out.jpg");
        assert_eq!(inv.flag_value("-ss"), Some("10"));
        assert_eq!(inv.flag_value("-vf"), None);
        assert_eq!(inv.output_arg(), Some("out.jpg"));
    }

    #[tokio::test]
    async fn process_runner_without_tool_is_unavailable() {
        let runner = ProcessRunner::new(ToolRegistry::default());
        assert!(!runner.is_available(Tool::Ffmpeg));
        let err = runner
            .run(Invocation::new(Tool::Ffmpeg, Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, flix_core::Error::ToolUnavailable { .. }));
    }
}
