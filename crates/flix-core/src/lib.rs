//! flix-core: shared types, errors, configuration, and the artifact layout.
//!
//! This crate is the foundational dependency for the other flix-* crates. It
//! owns the content-addressed [`MediaKey`], the probed media model, the
//! on-disk cache layout, the unified error type, and application config.

pub mod artifact;
pub mod config;
pub mod error;
pub mod key;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use artifact::{ArtifactKind, ArtifactLayout};
pub use error::{Error, Result};
pub use key::{derive_key, MediaKey};
pub use media::*;
