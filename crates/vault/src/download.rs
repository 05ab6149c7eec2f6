//! Download orchestration.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use repovault_protocol::{AssetPaths, FileEntry, FileMetadata};
use repovault_remote_store::StoreError;
use repovault_transfer::{TransferProgress, decompress_blocking, merge};

use crate::error::VaultError;
use crate::events::{DownloadState, Phase};
use crate::session::{Run, Vault};

const TRANSFER_START: f64 = 5.0;
const TRANSFER_END: f64 = 85.0;

/// What a download fetches: the entry and its chunk paths in index order.
struct DownloadPlan {
    entry: FileEntry,
    chunks: Vec<String>,
}

impl Vault {
    /// Downloads the file registered as `name` and returns its original bytes.
    pub async fn download(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        let mut run = self.begin_download(name);
        match self.download_inner(&mut run, name).await {
            Ok(data) => {
                run.advance(DownloadState::Done, 100.0);
                info!(file = name, bytes = data.len(), "download complete");
                Ok(data)
            }
            Err(e) => {
                let at = run.state();
                run.advance(DownloadState::Failed, 0.0);
                error!(file = name, state = ?at, error = %e, "download failed");
                Err(e)
            }
        }
    }

    /// Downloads `name` and writes it to `dest`.
    pub async fn download_to(&self, name: &str, dest: &Path) -> Result<u64, VaultError> {
        let data = self.download(name).await?;
        tokio::fs::write(dest, &data).await?;
        debug!(file = name, dest = %dest.display(), "written to disk");
        Ok(data.len() as u64)
    }

    async fn download_inner(
        &self,
        run: &mut Run<'_, DownloadState>,
        name: &str,
    ) -> Result<Vec<u8>, VaultError> {
        run.advance(DownloadState::LookupMetadata, 0.0);
        let plan = self.plan_download(name).await?;
        let count = plan.entry.chunk_count;

        run.advance(DownloadState::Transferring, TRANSFER_START);
        let chunks = &plan.chunks;
        let path_of = |i: usize| chunks[i - 1].clone();
        let on_progress = |p: TransferProgress| {
            let pct = TRANSFER_START + (TRANSFER_END - TRANSFER_START) * p.percentage() / 100.0;
            self.emit(name, Phase::Download(DownloadState::Transferring), pct);
        };
        let parts = self
            .engine
            .download_all(count, &path_of, &on_progress)
            .await?;

        run.advance(DownloadState::Merging, TRANSFER_END);
        let compressed = merge(&parts);
        drop(parts);
        if compressed.len() as u64 != plan.entry.compressed_size {
            warn!(
                file = name,
                expected = plan.entry.compressed_size,
                actual = compressed.len(),
                "compressed size differs from the recorded size"
            );
        }

        run.advance(DownloadState::Decompressing, 90.0);
        let data = decompress_blocking(Arc::clone(&self.codec), compressed).await?;
        if data.len() as u64 != plan.entry.original_size {
            return Err(VaultError::CodecFailure(format!(
                "{name}: decompressed {} bytes, expected {}",
                data.len(),
                plan.entry.original_size
            )));
        }
        Ok(data)
    }

    /// Resolves the registry entry, then prefers the per-file metadata
    /// object when it exists and parses.
    async fn plan_download(&self, name: &str) -> Result<DownloadPlan, VaultError> {
        let registry = self.refresh().await?;
        let entry = registry
            .find(name)
            .cloned()
            .ok_or_else(|| VaultError::RemoteNotFound(name.to_string()))?;
        let paths = AssetPaths::new(&self.config.assets_prefix, name)?;

        let fallback = |entry: FileEntry| DownloadPlan {
            chunks: paths.chunks(entry.chunk_count),
            entry,
        };

        let obj = match self.store.get(&paths.metadata()).await {
            Ok(obj) => obj,
            Err(StoreError::NotFound(_)) => {
                debug!(file = name, "no metadata object, using registry entry");
                return Ok(fallback(entry));
            }
            Err(e) => return Err(e.into()),
        };

        let meta = match FileMetadata::from_json(&obj.content) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(file = name, error = %e, "unreadable metadata object, using registry entry");
                return Ok(fallback(entry));
            }
        };

        if meta.entry.name != name {
            warn!(
                file = name,
                owner = %meta.entry.name,
                "metadata object belongs to another file, using registry entry"
            );
            return Ok(fallback(entry));
        }
        if meta.entry.chunk_count != entry.chunk_count {
            warn!(
                file = name,
                metadata = meta.entry.chunk_count,
                registry = entry.chunk_count,
                "chunk count differs between metadata and registry"
            );
        }
        if meta.chunks.len() == meta.entry.chunk_count {
            Ok(DownloadPlan {
                chunks: meta.chunks,
                entry: meta.entry,
            })
        } else {
            Ok(fallback(meta.entry))
        }
    }
}
