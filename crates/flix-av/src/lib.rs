//! # flix-av
//!
//! External tool plumbing and artifact generators for the media pipeline.
//!
//! - **Tool discovery** ([`ToolRegistry`]) finds `ffmpeg` and `ffprobe`.
//! - **Command execution** ([`ToolCommand`]) runs a process with a time
//!   budget, killing it when the budget expires.
//! - **Runner seam** ([`ToolRunner`]) decouples generators from processes;
//!   [`ProcessRunner`] is the real implementation.
//! - **Generators**: [`probe::probe`], [`thumbnail::generate_thumbnail`],
//!   [`previews::generate_previews`] and [`rendition::build_rendition`].
//! - **Staging** ([`Staging`]) makes every artifact appear atomically.

pub mod attempt;
pub mod command;
pub mod encoders;
pub mod previews;
pub mod probe;
pub mod rendition;
pub mod runner;
pub mod staging;
pub mod thumbnail;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use attempt::{Attempt, AttemptState};
pub use command::{ToolCommand, ToolOutput};
pub use encoders::{EncoderSelector, VideoEncoder};
pub use rendition::{RenditionOptions, RenditionReport};
pub use runner::{Invocation, ProcessRunner, SharedRunner, ToolRunner};
pub use staging::Staging;
pub use thumbnail::FrameOptions;
pub use tools::{Tool, ToolInfo, ToolRegistry};
