//! Data model shared by every repovault crate.
//!
//! Defines the registry document (`data.json`), the per-file entries it
//! holds, the per-file metadata object, and the path derivation used to
//! address chunk objects in the remote repository.

pub mod category;
pub mod constants;
pub mod paths;
pub mod types;

// Re-export primary types for convenience.
pub use category::{CATEGORY_TABLE, DEFAULT_CATEGORY, detect_category};
pub use paths::{AssetPaths, sanitize_file_name};
pub use types::{
    ChunkScheme, FileEntry, FileMetadata, Registry, Settings, compression_ratio, now_timestamp,
};

/// Errors produced while building or validating protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
