//! Best-effort removal of a stored file.

use serde::Serialize;
use tracing::{debug, info, warn};

use repovault_protocol::{AssetPaths, FileMetadata};
use repovault_remote_store::{StoreError, delete_if_present};

use crate::error::VaultError;
use crate::events::Phase;
use crate::session::Vault;

/// An object that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of [`Vault::delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub name: String,
    /// Whether the registry listed the file.
    pub found: bool,
    /// Objects deleted by this call.
    pub removed: Vec<String>,
    /// Objects that were already gone.
    pub already_absent: Vec<String>,
    pub failed: Vec<DeleteFailure>,
    /// Whether the registry entry was removed.
    pub entry_removed: bool,
    /// Another registered file stored in the same folder. When set, no
    /// object was touched and only the registry entry was removed.
    pub shared_with: Option<String>,
}

impl DeleteReport {
    /// True when nothing of the file is left.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && (self.entry_removed || !self.found)
    }
}

impl Vault {
    /// Deletes every object of `name`, then its registry entry.
    ///
    /// Object failures are collected rather than aborting. The registry
    /// entry is only removed once every object is gone, so running the
    /// delete again finishes the cleanup. Unknown names yield an empty report.
    pub async fn delete(&self, name: &str) -> Result<DeleteReport, VaultError> {
        let _guard = self.begin_delete(name);
        let mut report = DeleteReport {
            name: name.to_string(),
            ..Default::default()
        };

        let registry = self.refresh().await?;
        let Some(entry) = registry.find(name).cloned() else {
            debug!(file = name, "not in registry, nothing to delete");
            return Ok(report);
        };
        report.found = true;

        let paths = AssetPaths::new(&self.config.assets_prefix, name)?;
        report.shared_with = registry
            .files
            .iter()
            .filter(|other| other.name != name)
            .find(|other| {
                AssetPaths::new(&self.config.assets_prefix, &other.name)
                    .is_ok_and(|p| p.folder() == paths.folder())
            })
            .map(|other| other.name.clone());
        if let Some(other) = &report.shared_with {
            warn!(file = name, other = %other, folder = paths.folder(), "folder shared, objects kept");
            let registry = self.registry.remove_file_entry(name).await?;
            self.update_cache(registry).await;
            report.entry_removed = true;
            return Ok(report);
        }

        let mut targets = self
            .chunk_paths_for_delete(name, &paths, entry.chunk_count)
            .await;
        targets.push(paths.metadata());

        let total = targets.len();
        for (done, path) in targets.into_iter().enumerate() {
            let message = format!("Delete {path}");
            match delete_if_present(self.store.as_ref(), &path, &message).await {
                Ok(true) => {
                    debug!(%path, "object deleted");
                    report.removed.push(path);
                }
                Ok(false) => report.already_absent.push(path),
                Err(e) => {
                    warn!(%path, error = %e, "could not delete object");
                    report.failed.push(DeleteFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
            self.emit(name, Phase::Delete, 90.0 * (done + 1) as f64 / total as f64);
        }

        if report.failed.is_empty() {
            let registry = self.registry.remove_file_entry(name).await?;
            self.update_cache(registry).await;
            report.entry_removed = true;
            info!(
                file = name,
                removed = report.removed.len(),
                absent = report.already_absent.len(),
                "file deleted"
            );
        } else {
            warn!(
                file = name,
                failed = report.failed.len(),
                "delete incomplete, registry entry kept"
            );
        }
        Ok(report)
    }

    /// Chunk paths listed in the metadata object, or derived from the
    /// registry's chunk count when the metadata is missing, unreadable or
    /// describes another file.
    async fn chunk_paths_for_delete(
        &self,
        name: &str,
        paths: &AssetPaths,
        chunk_count: usize,
    ) -> Vec<String> {
        let derived = paths.chunks(chunk_count);
        let meta = match self.store.get(&paths.metadata()).await {
            Ok(obj) => FileMetadata::from_json(&obj.content)
                .ok()
                .filter(|meta| meta.entry.name == name),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                debug!(error = %e, "metadata unavailable for delete");
                None
            }
        };
        match meta {
            Some(meta) if meta.chunks.len() > derived.len() => meta.chunks,
            _ => derived,
        }
    }
}

#[cfg(test)]
mod tests {
    use repovault_protocol::{FileEntry, Registry};
    use repovault_remote_store::{FaultOp, StoreError};

    use super::*;
    use crate::config::VaultConfig;
    use crate::error::ErrorKind;
    use crate::testing::memory_vault;

    fn noisy(len: u32) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(2246822519) >> 11) as u8).collect()
    }

    #[tokio::test]
    async fn delete_removes_every_object_and_entry() {
        let (store, vault) = memory_vault(VaultConfig {
            chunk_size: 100,
            ..Default::default()
        });
        vault.upload("keep.txt", b"keep".to_vec()).await.unwrap();
        let entry = vault.upload("a.bin", noisy(1000)).await.unwrap();

        let report = vault.delete("a.bin").await.unwrap();

        assert!(report.found);
        assert!(report.is_complete());
        assert_eq!(report.removed.len(), entry.chunk_count + 1);
        assert!(store.paths().iter().all(|p| !p.starts_with("assets/a.bin/")));
        let names: Vec<_> = vault.list().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["keep.txt"]);
    }

    #[tokio::test]
    async fn second_delete_is_noop() {
        let (store, vault) = memory_vault(VaultConfig::default());
        vault.upload("a.bin", b"abc".to_vec()).await.unwrap();
        vault.delete("a.bin").await.unwrap();
        let puts = store.calls(FaultOp::Put);

        let report = vault.delete("a.bin").await.unwrap();
        assert!(!report.found);
        assert!(report.is_complete());
        assert!(report.removed.is_empty());
        assert_eq!(store.calls(FaultOp::Put), puts);
    }

    #[tokio::test]
    async fn failed_object_keeps_entry_until_rerun() {
        let (store, vault) = memory_vault(VaultConfig {
            chunk_size: 100,
            ..Default::default()
        });
        vault.upload("a.bin", noisy(1000)).await.unwrap();
        store.fail_next(FaultOp::Delete, "assets/a.bin/chunk_00002.gz", 1);

        let report = vault.delete("a.bin").await.unwrap();
        assert!(!report.is_complete());
        assert!(!report.entry_removed);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "assets/a.bin/chunk_00002.gz");
        assert!(store.contains("assets/a.bin/chunk_00002.gz"));
        assert!(vault.registry.find("a.bin").await.unwrap().is_some());

        let report = vault.delete("a.bin").await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.removed, vec!["assets/a.bin/chunk_00002.gz"]);
        assert!(report.already_absent.len() > 1);
        assert!(vault.registry.find("a.bin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_metadata_uses_registry_count() {
        let (store, vault) = memory_vault(VaultConfig {
            chunk_size: 100,
            ..Default::default()
        });
        let entry = vault.upload("a.bin", noisy(1000)).await.unwrap();
        delete_if_present(store.as_ref(), "assets/a.bin/metadata.json", "rm")
            .await
            .unwrap();

        let report = vault.delete("a.bin").await.unwrap();
        assert_eq!(report.removed.len(), entry.chunk_count);
        assert_eq!(report.already_absent, vec!["assets/a.bin/metadata.json"]);
        assert!(store.paths().iter().all(|p| !p.starts_with("assets/a.bin/")));
    }

    #[tokio::test]
    async fn shared_folder_keeps_objects() {
        let (store, vault) = memory_vault(VaultConfig::default());
        vault.upload("a b.txt", b"first file".to_vec()).await.unwrap();
        let mut registry = Registry::from_json(&store.object("data.json").unwrap()).unwrap();
        registry.upsert(FileEntry::new("a_b.txt", 10, 30, 1, 1024));
        store.insert("data.json", registry.to_json_pretty().unwrap());

        let report = vault.delete("a b.txt").await.unwrap();
        assert_eq!(report.shared_with.as_deref(), Some("a_b.txt"));
        assert!(report.entry_removed);
        assert!(report.removed.is_empty());
        assert!(store.contains("assets/a_b.txt/chunk_00001.gz"));
        assert!(store.contains("assets/a_b.txt/metadata.json"));
        let names: Vec<_> = vault.list().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a_b.txt"]);
    }

    #[tokio::test]
    async fn metadata_of_another_name_does_not_widen_delete() {
        let (store, vault) = memory_vault(VaultConfig::default());
        vault.upload("a.bin", b"abc".to_vec()).await.unwrap();
        let path = "assets/a.bin/metadata.json";
        let mut meta = FileMetadata::from_json(&store.object(path).unwrap()).unwrap();
        meta.entry.name = "other".into();
        meta.chunks = (1..=3).map(|i| format!("assets/a.bin/chunk_{i:05}.gz")).collect();
        store.insert(path, meta.to_json_pretty().unwrap());
        store.insert("assets/a.bin/chunk_00002.gz", b"kept".to_vec());

        let report = vault.delete("a.bin").await.unwrap();
        assert!(report.is_complete());
        assert_eq!(
            report.removed,
            vec!["assets/a.bin/chunk_00001.gz", "assets/a.bin/metadata.json"]
        );
        assert!(store.contains("assets/a.bin/chunk_00002.gz"));
    }

    #[tokio::test]
    async fn registry_auth_failure_propagates() {
        let (store, vault) = memory_vault(VaultConfig::default());
        store.fail_next_with(FaultOp::Get, "data.json", 1, |_| StoreError::Auth {
            status: 401,
        });
        let err = vault.delete("a.bin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteAuthFailure);
        assert!(vault.in_flight().is_empty());
    }
}
