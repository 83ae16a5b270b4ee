//! # Asset Error Types
//!
//! Every way a model file can fail to load. All of them are per-asset:
//! the caller skips the asset and keeps going.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Direction of a format-version mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionSkew {
    /// File predates this build. The asset extractor must be rerun.
    Older,
    /// File was produced by a newer toolchain. The client must be updated.
    Newer,
}

impl VersionSkew {
    /// Classifies `found` relative to `expected`. `None` when they match.
    #[must_use]
    pub fn classify(found: u32, expected: u32) -> Option<Self> {
        match found.cmp(&expected) {
            std::cmp::Ordering::Less => Some(Self::Older),
            std::cmp::Ordering::Greater => Some(Self::Newer),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for VersionSkew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Older => f.write_str("file is outdated, rerun the asset extractor"),
            Self::Newer => f.write_str("file is newer than this client, update the client"),
        }
    }
}

/// Errors that can occur while loading an asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// Backing file does not exist.
    #[error("asset not found: {}", .path.display())]
    NotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// Header version differs from the one this build reads.
    #[error("{}: version {found}, expected {expected}: {skew}", .path.display())]
    VersionMismatch {
        /// Offending file.
        path: PathBuf,
        /// Version stored in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
        /// Older or newer.
        skew: VersionSkew,
    },

    /// Header token identifies a different file family.
    #[error("{}: invalid token {found:#010x}, expected {expected:#010x}", .path.display())]
    InvalidToken {
        /// Offending file.
        path: PathBuf,
        /// Token stored in the file.
        found: u32,
        /// Token of the expected family.
        expected: u32,
    },

    /// Truncated or structurally invalid content.
    #[error("malformed asset {}: {reason}", .path.display())]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Any other I/O failure while reading the file.
    #[error("failed to read {}: {reason}", .path.display())]
    Io {
        /// Offending file.
        path: PathBuf,
        /// Underlying error text.
        reason: String,
    },
}

impl AssetError {
    /// Path of the asset that failed.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound { path }
            | Self::VersionMismatch { path, .. }
            | Self::InvalidToken { path, .. }
            | Self::Malformed { path, .. }
            | Self::Io { path, .. } => path,
        }
    }

    /// Shorthand for [`AssetError::Malformed`].
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_skew() {
        assert_eq!(VersionSkew::classify(3, 4), Some(VersionSkew::Older));
        assert_eq!(VersionSkew::classify(5, 4), Some(VersionSkew::Newer));
        assert_eq!(VersionSkew::classify(4, 4), None);
    }

    #[test]
    fn test_messages_name_the_remedy() {
        let older = AssetError::VersionMismatch {
            path: PathBuf::from("models/tree.cmodel"),
            found: 1,
            expected: 2,
            skew: VersionSkew::Older,
        };
        let text = older.to_string();
        assert!(text.contains("models/tree.cmodel"));
        assert!(text.contains("rerun the asset extractor"));

        let newer = AssetError::VersionMismatch {
            path: PathBuf::from("a"),
            found: 3,
            expected: 2,
            skew: VersionSkew::Newer,
        };
        assert!(newer.to_string().contains("update the client"));
    }
}
