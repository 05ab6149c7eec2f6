//! Upload orchestration.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use repovault_protocol::{AssetPaths, FileEntry, FileMetadata};
use repovault_remote_store::put_replacing;
use repovault_transfer::{TransferProgress, compress_blocking, split};

use crate::error::VaultError;
use crate::events::{Phase, UploadState};
use crate::session::{Run, Vault};

const TRANSFER_START: f64 = 15.0;
const TRANSFER_END: f64 = 90.0;

impl Vault {
    /// Uploads `data` under `name` and registers it.
    ///
    /// On success every chunk, the metadata object and the registry entry
    /// are written. A failure before the registry step leaves no entry;
    /// chunks already written stay on the store.
    ///
    /// A name that is already registered, or whose folder another registered
    /// name already uses, is rejected before anything is written. Replacing a
    /// stored file means deleting it first.
    pub async fn upload(&self, name: &str, data: Vec<u8>) -> Result<FileEntry, VaultError> {
        let mut run = self.begin_upload(name);
        match self.upload_inner(&mut run, name, data).await {
            Ok(entry) => {
                run.advance(UploadState::Done, 100.0);
                info!(
                    file = name,
                    original = entry.original_size,
                    compressed = entry.compressed_size,
                    chunks = entry.chunk_count,
                    "upload complete"
                );
                Ok(entry)
            }
            Err(e) => {
                let at = run.state();
                run.advance(UploadState::Failed, 0.0);
                error!(file = name, state = ?at, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    /// Reads `path` and uploads it under its file name.
    pub async fn upload_file(&self, path: &Path) -> Result<FileEntry, VaultError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                VaultError::PreconditionFailure(format!("no file name in {}", path.display()))
            })?
            .to_string();

        let size = tokio::fs::metadata(path).await?.len();
        self.check_size(&name, size)?;

        let data = tokio::fs::read(path).await?;
        self.upload(&name, data).await
    }

    fn check_size(&self, name: &str, size: u64) -> Result<(), VaultError> {
        if size > self.config.max_file_size {
            return Err(VaultError::PreconditionFailure(format!(
                "{name} is {size} bytes, larger than the {} byte limit",
                self.config.max_file_size
            )));
        }
        Ok(())
    }

    async fn check_folder_free(&self, name: &str, paths: &AssetPaths) -> Result<(), VaultError> {
        let registry = self.refresh().await?;
        for existing in &registry.files {
            if existing.name == name {
                return Err(VaultError::PreconditionFailure(format!(
                    "{name} is already stored; delete it before uploading again"
                )));
            }
            let shared = AssetPaths::new(&self.config.assets_prefix, &existing.name)
                .is_ok_and(|other| other.folder() == paths.folder());
            if shared {
                return Err(VaultError::PreconditionFailure(format!(
                    "{name} maps to {}, already used by {}",
                    paths.folder(),
                    existing.name
                )));
            }
        }
        Ok(())
    }

    async fn upload_inner(
        &self,
        run: &mut Run<'_, UploadState>,
        name: &str,
        data: Vec<u8>,
    ) -> Result<FileEntry, VaultError> {
        let paths = AssetPaths::new(&self.config.assets_prefix, name)?;
        let original_size = data.len() as u64;
        self.check_size(name, original_size)?;
        self.check_folder_free(name, &paths).await?;

        run.advance(UploadState::Compressing, 0.0);
        let compressed = compress_blocking(Arc::clone(&self.codec), data).await?;
        debug!(
            file = name,
            original = original_size,
            compressed = compressed.len(),
            "compressed"
        );

        run.advance(UploadState::Chunking, 10.0);
        let chunks = split(&compressed, self.config.chunk_size)?;
        let chunk_count = chunks.len();

        run.advance(UploadState::Transferring, TRANSFER_START);
        let path_of = |i: usize| paths.chunk(i);
        let on_progress = |p: TransferProgress| {
            let pct = TRANSFER_START + (TRANSFER_END - TRANSFER_START) * p.percentage() / 100.0;
            self.emit(name, Phase::Upload(UploadState::Transferring), pct);
        };
        self.engine
            .upload_all(name, &chunks, &path_of, &on_progress)
            .await?;

        run.advance(UploadState::RegisteringMetadata, TRANSFER_END);
        let entry = FileEntry::new(
            name,
            original_size,
            compressed.len() as u64,
            chunk_count,
            self.config.chunk_size,
        );
        let metadata = FileMetadata {
            entry: entry.clone(),
            chunks: paths.chunks(chunk_count),
        };
        put_replacing(
            self.store.as_ref(),
            &paths.metadata(),
            &metadata.to_json_pretty()?,
            &format!("Update metadata for {name}"),
        )
        .await?;

        let registry = self.registry.append_file_entry(entry.clone()).await?;
        self.update_cache(registry).await;
        Ok(entry)
    }
}
