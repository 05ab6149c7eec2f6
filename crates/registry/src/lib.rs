//! Registry document manager.
//!
//! The registry (`data.json`) is the single index of stored files. Every
//! change is a full read-modify-write of the document: the write carries
//! the token obtained by the same read, so a concurrent writer makes it
//! fail with a conflict instead of being overwritten. On conflict the whole
//! cycle starts over from a fresh read.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use repovault_protocol::constants::REGISTRY_PATH;
use repovault_protocol::{FileEntry, ProtocolError, Registry};
use repovault_remote_store::{ObjectStore, StoreError};

/// Default number of read-modify-write cycles before giving up on conflicts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// Errors from the registry manager.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The stored document could not be parsed. `raw` holds it untouched.
    #[error("registry document is corrupt: {reason}")]
    Corrupt { raw: String, reason: String },

    #[error("registry write kept conflicting after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A registry together with the token of the version it was read from.
#[derive(Debug, Clone)]
pub struct VersionedRegistry {
    pub registry: Registry,
    /// `None` when the document does not exist yet.
    pub token: Option<String>,
}

/// Reads and updates the registry document.
pub struct RegistryManager {
    store: Arc<dyn ObjectStore>,
    path: String,
    max_attempts: u32,
}

impl RegistryManager {
    /// Creates a manager for `data.json` on `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            path: REGISTRY_PATH.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Uses a different document path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the number of read-modify-write cycles tried on conflicts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Path of the registry document.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetches the registry and its token.
    ///
    /// A missing document yields an empty registry with no token.
    pub async fn read_versioned(&self) -> Result<VersionedRegistry, RegistryError> {
        let obj = match self.store.get(&self.path).await {
            Ok(obj) => obj,
            Err(StoreError::NotFound(_)) => {
                debug!(path = %self.path, "registry not found, starting empty");
                return Ok(VersionedRegistry {
                    registry: Registry::default(),
                    token: None,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let registry = Registry::from_json(&obj.content).map_err(|e| RegistryError::Corrupt {
            raw: String::from_utf8_lossy(&obj.content).into_owned(),
            reason: e.to_string(),
        })?;

        Ok(VersionedRegistry {
            registry,
            token: Some(obj.token),
        })
    }

    /// Fetches the current registry.
    pub async fn read_current(&self) -> Result<Registry, RegistryError> {
        Ok(self.read_versioned().await?.registry)
    }

    /// Looks up an entry by exact name on a fresh read.
    pub async fn find(&self, name: &str) -> Result<Option<FileEntry>, RegistryError> {
        Ok(self.read_current().await?.find(name).cloned())
    }

    /// Appends `entry`, replacing an entry with the same name in place.
    ///
    /// Returns the registry as written.
    pub async fn append_file_entry(&self, entry: FileEntry) -> Result<Registry, RegistryError> {
        let name = entry.name.clone();
        let registry = self
            .modify("Update registry", |reg| {
                reg.upsert(entry.clone());
                true
            })
            .await?;
        info!(file = %name, files = registry.files.len(), "registry entry written");
        Ok(registry)
    }

    /// Removes the entry named `name`. Absent names leave the document untouched.
    pub async fn remove_file_entry(&self, name: &str) -> Result<Registry, RegistryError> {
        let registry = self
            .modify("Update registry", |reg| reg.remove(name))
            .await?;
        info!(file = %name, files = registry.files.len(), "registry entry removed");
        Ok(registry)
    }

    /// Read-modify-write loop. `change` returns whether it modified the
    /// registry; when it did not, nothing is written.
    async fn modify<F>(&self, message: &str, mut change: F) -> Result<Registry, RegistryError>
    where
        F: FnMut(&mut Registry) -> bool,
    {
        let mut attempt = 1;
        loop {
            let VersionedRegistry {
                mut registry,
                token,
            } = self.read_versioned().await?;

            if !change(&mut registry) {
                return Ok(registry);
            }

            let body = registry.to_json_pretty()?;
            match self
                .store
                .put(&self.path, &body, token.as_deref(), message)
                .await
            {
                Ok(_) => return Ok(registry),
                Err(StoreError::Conflict(_)) if attempt < self.max_attempts => {
                    warn!(path = %self.path, attempt, "registry changed underneath, retrying");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => {
                    return Err(RegistryError::Conflict { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
