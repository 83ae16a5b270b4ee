//! Common `{token, version}` header of every asset file.

use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::error::{AssetError, AssetResult, VersionSkew};

/// Builds a little-endian format token from four ASCII bytes.
#[must_use]
pub const fn token(tag: [u8; 4]) -> u32 {
    u32::from_le_bytes(tag)
}

/// First eight bytes of every asset file.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FileHeader {
    /// Format family.
    pub token: u32,
    /// Format revision. Must match exactly.
    pub version: u32,
}

impl FileHeader {
    /// Validates token first, then version.
    pub fn check(&self, path: &Path, token: u32, version: u32) -> AssetResult<()> {
        if self.token != token {
            return Err(AssetError::InvalidToken {
                path: path.to_path_buf(),
                found: self.token,
                expected: token,
            });
        }
        if let Some(skew) = VersionSkew::classify(self.version, version) {
            return Err(AssetError::VersionMismatch {
                path: path.to_path_buf(),
                found: self.version,
                expected: version,
                skew,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: u32 = token(*b"TEST");

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 8);
    }

    #[test]
    fn test_token_checked_before_version() {
        let header = FileHeader { token: 0, version: 0 };
        let err = header.check(Path::new("a"), TOKEN, 3).unwrap_err();
        assert!(matches!(err, AssetError::InvalidToken { .. }));
    }

    #[test]
    fn test_version_skew() {
        let older = FileHeader { token: TOKEN, version: 2 };
        assert!(matches!(
            older.check(Path::new("a"), TOKEN, 3),
            Err(AssetError::VersionMismatch { skew: VersionSkew::Older, .. })
        ));

        let newer = FileHeader { token: TOKEN, version: 4 };
        assert!(matches!(
            newer.check(Path::new("a"), TOKEN, 3),
            Err(AssetError::VersionMismatch { skew: VersionSkew::Newer, .. })
        ));

        let exact = FileHeader { token: TOKEN, version: 3 };
        assert!(exact.check(Path::new("a"), TOKEN, 3).is_ok());
    }
}
