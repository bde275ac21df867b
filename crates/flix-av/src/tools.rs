//! External tool detection.
//!
//! The [`ToolRegistry`] discovers and caches the locations of `ffmpeg` and
//! `ffprobe`. A missing tool disables only the features that need it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// External tools the pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    /// Executable name looked up on `PATH`.
    pub fn name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output, if the tool ran.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<Tool, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools, preferring configured paths that exist and falling
    /// back to [`which::which`]. Tools that are not found are omitted.
    pub fn discover(tools_config: &flix_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for tool in Tool::ALL {
            let custom_path = match tool {
                Tool::Ffmpeg => tools_config.ffmpeg_path.as_deref(),
                Tool::Ffprobe => tools_config.ffprobe_path.as_deref(),
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {tool} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(tool.name()).ok()
                }
                None => which::which(tool.name()).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!(tool = %tool, path = %path.display(), "Tool discovered");
                    tools.insert(tool, path);
                }
                None => tracing::warn!(tool = %tool, "Tool not found; dependent features disabled"),
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths.
    pub fn with_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        Self {
            tools: paths.into_iter().collect(),
        }
    }

    /// Path of `tool`, or [`flix_core::Error::ToolUnavailable`].
    pub fn require(&self, tool: Tool) -> flix_core::Result<&Path> {
        self.tools
            .get(&tool)
            .map(PathBuf::as_path)
            .ok_or_else(|| flix_core::Error::tool_unavailable(tool.name()))
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.tools.contains_key(&tool)
    }

    /// Check every known tool and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .iter()
            .map(|&tool| match self.tools.get(&tool) {
                Some(path) => ToolInfo {
                    name: tool.name().to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: tool.name().to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
