//! Compression, chunking and chunk transfer with retry.
//!
//! A file travels through this crate as:
//!
//! 1. **Compress**: gzip the whole payload ([`Codec`])
//! 2. **Split**: cut the compressed blob into fixed-size [`Chunk`]s
//! 3. **Transfer**: put or get every chunk against the object store in
//!    concurrent batches, retrying transient failures ([`TransferEngine`])
//! 4. **Merge**: concatenate downloaded chunks in index order

mod chunked;
mod codec;
mod engine;
mod progress;
mod retry;
mod types;

pub use chunked::{chunk_count, merge, split};
pub use codec::{Codec, CodecError, GzipCodec, compress_blocking, decompress_blocking};
pub use engine::TransferEngine;
pub use progress::TransferProgress;
pub use retry::RetryPolicy;
pub use types::Chunk;

use repovault_remote_store::StoreError;

/// Default chunk size: 50 MiB.
///
/// Its base64 encoding, about 70 MB, stays under the contents API object limit.
pub const DEFAULT_CHUNK_SIZE: usize = 50 * 1024 * 1024;

/// Default number of chunks in flight at once.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("chunk {index} ({path}) failed after {attempts} attempts: {source}")]
    ChunkTransferFailure {
        index: usize,
        path: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("chunk {index} ({path}): {source}")]
    Store {
        index: usize,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransferError {
    /// The store error behind a failed chunk, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            TransferError::ChunkTransferFailure { source, .. }
            | TransferError::Store { source, .. } => Some(source),
            TransferError::InvalidChunkSize | TransferError::Codec(_) => None,
        }
    }
}
