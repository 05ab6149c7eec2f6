//! Chunked file storage on top of a repository contents API.
//!
//! A [`Vault`] session uploads a file by compressing it, splitting the
//! compressed blob into numbered chunk objects under `assets/<name>/`,
//! writing a per-file `metadata.json` and finally recording a
//! [`FileEntry`](repovault_protocol::FileEntry) in the shared `data.json`
//! registry. Downloads run the same pipeline backwards.
//!
//! ```no_run
//! # async fn demo() -> Result<(), repovault_vault::VaultError> {
//! use std::sync::Arc;
//! use repovault_protocol::Settings;
//! use repovault_transfer::GzipCodec;
//! use repovault_vault::Vault;
//!
//! let settings = Settings {
//!     token: "ghp_...".into(),
//!     owner: "me".into(),
//!     repo: "storage".into(),
//!     branch: "main".into(),
//! };
//! let vault = Vault::builder(settings)
//!     .codec(Arc::new(GzipCodec::default()))
//!     .build()?;
//! vault.upload("notes.txt", b"hello".to_vec()).await?;
//! let _bytes = vault.download("notes.txt").await?;
//! # Ok(()) }
//! ```

pub mod config;
mod delete;
mod download;
pub mod error;
pub mod events;
mod session;
mod stats;
mod upload;

pub use config::{DEFAULT_MAX_FILE_SIZE, MAX_OBJECT_SIZE, VaultConfig};
pub use delete::{DeleteFailure, DeleteReport};
pub use error::{ErrorKind, VaultError};
pub use events::{DownloadState, Phase, ProgressCallback, ProgressEvent, UploadState};
pub use session::{Vault, VaultBuilder};
pub use stats::VaultStats;
