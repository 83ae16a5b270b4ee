//! Where asset bytes come from.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AssetError, AssetResult};

/// Read-only provider of asset files, addressed by relative path.
pub trait AssetSource {
    /// Returns the whole file. A missing file is [`AssetError::NotFound`].
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>>;
}

/// Reads assets from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    /// Directory every asset path is relative to.
    root: PathBuf,
}

impl FsAssetSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory every asset path is relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FsAssetSource {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>> {
        std::fs::read(self.root.join(path)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound {
                path: path.to_path_buf(),
            },
            _ => AssetError::Io {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        })
    }
}

/// In-memory asset files. Used by tools and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    /// Files by path.
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryAssetSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    /// Removes a file, returning its bytes.
    pub fn remove(&mut self, path: &Path) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true when no files are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssetSource {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

impl<S: AssetSource + ?Sized> AssetSource for &S {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>> {
        (**self).read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let mut source = MemoryAssetSource::new();
        source.insert("a/b.cmodel", vec![1, 2, 3]);
        assert_eq!(source.read(Path::new("a/b.cmodel")).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            source.read(Path::new("missing")),
            Err(AssetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_fs_source_missing_file() {
        let source = FsAssetSource::new(std::env::temp_dir().join("verdant-does-not-exist"));
        let err = source.read(Path::new("nope.cmodel")).unwrap_err();
        assert_eq!(
            err,
            AssetError::NotFound {
                path: PathBuf::from("nope.cmodel")
            }
        );
    }
}
