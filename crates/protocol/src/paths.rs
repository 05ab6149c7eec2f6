//! Remote path derivation for chunk and metadata objects.
//!
//! Every stored file owns one folder under the assets prefix:
//!
//! ```text
//! assets/<sanitized-name>/chunk_00001.gz
//! assets/<sanitized-name>/chunk_00002.gz
//! assets/<sanitized-name>/metadata.json
//! ```
//!
//! Uploads and downloads both go through [`AssetPaths`], so the two sides
//! always derive identical paths.

use crate::ProtocolError;
use crate::constants::{CHUNK_EXTENSION, CHUNK_INDEX_WIDTH, METADATA_FILE_NAME};

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Rejects:
/// - Empty names
/// - Names that collapse to `.` or `..`
pub fn sanitize_file_name(name: &str) -> Result<String, ProtocolError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Precondition("empty file name".into()));
    }

    let sanitized: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized == "." || sanitized == ".." {
        return Err(ProtocolError::Precondition(format!(
            "file name not usable as a path segment: {name}"
        )));
    }

    Ok(sanitized)
}

/// Path deriver for one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    folder: String,
}

impl AssetPaths {
    /// Builds the deriver for `file_name` under `assets_prefix`.
    pub fn new(assets_prefix: &str, file_name: &str) -> Result<Self, ProtocolError> {
        let sanitized = sanitize_file_name(file_name)?;
        let prefix = assets_prefix.trim_matches('/');
        let folder = if prefix.is_empty() {
            sanitized
        } else {
            format!("{prefix}/{sanitized}")
        };
        Ok(Self { folder })
    }

    /// Folder holding every object of this file.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Path of the chunk with the given 1-based index.
    pub fn chunk(&self, index: usize) -> String {
        format!(
            "{}/chunk_{index:0width$}.{CHUNK_EXTENSION}",
            self.folder,
            width = CHUNK_INDEX_WIDTH
        )
    }

    /// Paths of chunks `1..=count`, in order.
    pub fn chunks(&self, count: usize) -> Vec<String> {
        (1..=count).map(|i| self.chunk(i)).collect()
    }

    /// Path of the per-file metadata object.
    pub fn metadata(&self) -> String {
        format!("{}/{METADATA_FILE_NAME}", self.folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_file_name("my-file_v2.tar.gz").unwrap(), "my-file_v2.tar.gz");
    }

    #[test]
    fn sanitize_replaces_path_breakers() {
        assert_eq!(sanitize_file_name("a/b\\c d?.iso").unwrap(), "a_b_c_d_.iso");
        assert_eq!(sanitize_file_name("../etc/passwd").unwrap(), ".._etc_passwd");
    }

    #[test]
    fn sanitize_replaces_non_ascii() {
        assert_eq!(sanitize_file_name("café.txt").unwrap(), "caf_.txt");
    }

    #[test]
    fn sanitize_rejects_empty() {
        assert!(matches!(
            sanitize_file_name("   "),
            Err(ProtocolError::Precondition(_))
        ));
    }

    #[test]
    fn sanitize_rejects_dot_names() {
        assert!(sanitize_file_name(".").is_err());
        assert!(sanitize_file_name("..").is_err());
    }

    #[test]
    fn chunk_paths_are_zero_padded() {
        let paths = AssetPaths::new("assets", "game.iso").unwrap();
        assert_eq!(paths.chunk(1), "assets/game.iso/chunk_00001.gz");
        assert_eq!(paths.chunk(123), "assets/game.iso/chunk_00123.gz");
        assert_eq!(paths.metadata(), "assets/game.iso/metadata.json");
    }

    #[test]
    fn chunk_list_is_ordered() {
        let paths = AssetPaths::new("assets/", "x").unwrap();
        assert_eq!(
            paths.chunks(3),
            vec![
                "assets/x/chunk_00001.gz",
                "assets/x/chunk_00002.gz",
                "assets/x/chunk_00003.gz",
            ]
        );
        assert!(paths.chunks(0).is_empty());
    }

    #[test]
    fn empty_prefix_uses_root() {
        let paths = AssetPaths::new("", "f.bin").unwrap();
        assert_eq!(paths.folder(), "f.bin");
    }

    #[test]
    fn same_name_same_paths() {
        let a = AssetPaths::new("assets", "my file.iso").unwrap();
        let b = AssetPaths::new("assets", "my file.iso").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.folder(), "assets/my_file.iso");
    }
}
