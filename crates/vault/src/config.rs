//! Tuning knobs for a vault session.

use repovault_protocol::constants::{ASSETS_PREFIX, REGISTRY_PATH};
use repovault_registry::DEFAULT_MAX_ATTEMPTS;
use repovault_transfer::{DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, RetryPolicy};

use crate::error::VaultError;

/// Largest object the contents API accepts, measured after base64 encoding.
pub const MAX_OBJECT_SIZE: usize = 100 * 1000 * 1000;

/// Largest chunk whose base64 encoding fits in [`MAX_OBJECT_SIZE`].
pub const MAX_CHUNK_SIZE: usize = MAX_OBJECT_SIZE / 4 * 3;

fn encoded_len(raw: usize) -> usize {
    raw.div_ceil(3).saturating_mul(4)
}

/// Default ceiling on the size of a single uploaded file: 2 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    /// Bytes per chunk object.
    pub chunk_size: usize,
    /// Chunks in flight at once (1 = sequential).
    pub batch_size: usize,
    /// Per-chunk retry policy.
    pub retry: RetryPolicy,
    /// Largest accepted input file.
    pub max_file_size: u64,
    /// Path of the registry document.
    pub registry_path: String,
    /// Folder holding per-file chunk folders.
    pub assets_prefix: String,
    /// Registry read-modify-write cycles tried on conflicts.
    pub registry_max_attempts: u32,
    /// API base URL; `None` uses the public endpoint.
    pub api_base_url: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            registry_path: REGISTRY_PATH.into(),
            assets_prefix: ASSETS_PREFIX.into(),
            registry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            api_base_url: None,
        }
    }
}

impl VaultConfig {
    /// Checks the values against the store's limits.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.chunk_size == 0 {
            return Err(VaultError::PreconditionFailure(
                "chunk size must be greater than zero".into(),
            ));
        }
        if encoded_len(self.chunk_size) > MAX_OBJECT_SIZE {
            return Err(VaultError::PreconditionFailure(format!(
                "chunk size {} exceeds {MAX_CHUNK_SIZE} bytes; encoded it would pass the {MAX_OBJECT_SIZE} byte object limit",
                self.chunk_size
            )));
        }
        if self.registry_path.trim().is_empty() {
            return Err(VaultError::PreconditionFailure(
                "registry path is empty".into(),
            ));
        }
        Ok(())
    }
}
