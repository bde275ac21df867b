//! Content-addressed cache keys.
//!
//! A [`MediaKey`] names every derived artifact of a source file. It hashes the
//! file's path relative to the served root, not its bytes: renaming a file
//! changes its key, editing it in place does not.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Length of a key in hex characters (SHA-256).
const KEY_HEX_LEN: usize = 64;

/// Deterministic identifier for a relative media path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaKey(String);

impl MediaKey {
    /// Derive the key of a relative path string.
    pub fn derive(relative_path: &str) -> Self {
        let normalized = normalize_relative(relative_path);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Derive the key of a relative [`Path`].
    pub fn from_relative_path(path: &Path) -> Self {
        Self::derive(&path.to_string_lossy())
    }

    /// The lowercase hex form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`MediaKey::derive`].
pub fn derive_key(relative_path: &str) -> MediaKey {
    MediaKey::derive(relative_path)
}

/// Normalize a relative path so equivalent spellings hash identically.
///
/// Backslashes become `/`, empty and `.` segments are dropped, so
/// `./a\\b//c/` and `a/b/c` normalize to the same string.
pub fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MediaKey {
    type Err = crate::Error;

    /// Parse a key received from a client. Only well-formed hex digests are
    /// accepted, so a parsed key is always safe to join onto a cache path.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let well_formed = s.len() == KEY_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::Validation(format!("invalid media key: {s}")))
        }
    }
}
