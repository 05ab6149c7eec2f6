//! Batched chunk transfer against an object store.
//!
//! Chunks are grouped into batches of `batch_size`. Every member of a batch
//! is in flight at once and the next batch starts only after the whole
//! batch has settled, which bounds concurrent requests against the API.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::future::join_all;
use tracing::{debug, warn};

use repovault_remote_store::{ObjectStore, StoreError, current_token};

use crate::progress::TransferProgress;
use crate::retry::RetryPolicy;
use crate::types::Chunk;
use crate::{DEFAULT_BATCH_SIZE, TransferError};

/// Counts completed chunks and notifies the caller after each one.
struct Tally<'a> {
    completed: AtomicUsize,
    bytes: AtomicU64,
    total: usize,
    on_progress: &'a (dyn Fn(TransferProgress) + Send + Sync),
}

impl Tally<'_> {
    fn record(&self, bytes: usize) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.bytes.fetch_add(bytes as u64, Ordering::Relaxed) + bytes as u64;
        (self.on_progress)(TransferProgress {
            completed,
            total: self.total,
            bytes,
        });
    }
}

/// Moves chunks between memory and the object store.
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl TransferEngine {
    /// Creates an engine. A `batch_size` of 0 falls back to [`DEFAULT_BATCH_SIZE`];
    /// a batch size of 1 transfers strictly one chunk at a time.
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy, batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        Self {
            store,
            retry,
            batch_size,
        }
    }

    /// Number of chunks in flight at once.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Uploads every chunk to `path_of(index)`.
    ///
    /// Any chunk that cannot be stored aborts the operation once its batch has
    /// settled. Chunks already written stay on the store.
    pub async fn upload_all(
        &self,
        label: &str,
        chunks: &[Chunk<'_>],
        path_of: &(dyn Fn(usize) -> String + Send + Sync),
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<(), TransferError> {
        let tally = Tally {
            completed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            total: chunks.len(),
            on_progress,
        };

        for batch in chunks.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|chunk| {
                let tally = &tally;
                async move {
                    let path = path_of(chunk.index);
                    self.upload_chunk(label, chunk, tally.total, &path).await?;
                    tally.record(chunk.len());
                    Ok::<_, TransferError>(())
                }
            }))
            .await;

            for result in results {
                result?;
            }
        }

        debug!(label, chunks = chunks.len(), "all chunks uploaded");
        Ok(())
    }

    /// Downloads chunks `1..=count` from `path_of(index)`.
    ///
    /// The result is in ascending index order whatever order the requests
    /// completed in. A missing chunk fails the whole download.
    pub async fn download_all(
        &self,
        count: usize,
        path_of: &(dyn Fn(usize) -> String + Send + Sync),
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<Vec<Vec<u8>>, TransferError> {
        let tally = Tally {
            completed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            total: count,
            on_progress,
        };
        let indices: Vec<usize> = (1..=count).collect();
        let mut parts = Vec::with_capacity(count);

        for batch in indices.chunks(self.batch_size) {
            let results = join_all(batch.iter().map(|&index| {
                let tally = &tally;
                async move {
                    let path = path_of(index);
                    let data = self.download_chunk(index, &path).await?;
                    tally.record(data.len());
                    Ok::<_, TransferError>(data)
                }
            }))
            .await;

            // join_all yields results in input order.
            for result in results {
                parts.push(result?);
            }
        }

        debug!(chunks = count, "all chunks downloaded");
        Ok(parts)
    }

    async fn upload_chunk(
        &self,
        label: &str,
        chunk: &Chunk<'_>,
        total: usize,
        path: &str,
    ) -> Result<(), TransferError> {
        let message = format!("Upload {label} chunk {}/{total}", chunk.index);
        let message = message.as_str();
        let store = self.store.as_ref();
        let data = chunk.data;

        self.with_retry(chunk.index, path, move || async move {
            match store.put(path, data, None, message).await {
                // Leftover from an earlier attempt: overwrite it.
                Err(StoreError::Conflict(_)) => {
                    let token = current_token(store, path).await?;
                    store.put(path, data, token.as_deref(), message).await
                }
                other => other,
            }
        })
        .await?;

        debug!(path, index = chunk.index, bytes = chunk.len(), "chunk uploaded");
        Ok(())
    }

    async fn download_chunk(&self, index: usize, path: &str) -> Result<Vec<u8>, TransferError> {
        let store = self.store.as_ref();
        let obj = self
            .with_retry(index, path, move || async move { store.get(path).await })
            .await?;
        debug!(path, index, bytes = obj.content.len(), "chunk downloaded");
        Ok(obj.content)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// policy's attempts are used up.
    async fn with_retry<T, F, Fut>(
        &self,
        index: usize,
        path: &str,
        mut op: F,
    ) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    return Err(TransferError::Store {
                        index,
                        path: path.to_string(),
                        source: e,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(path, index, attempts = attempt, error = %e, "chunk retries exhausted");
                    return Err(TransferError::ChunkTransferFailure {
                        index,
                        path: path.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        path,
                        index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chunk transfer failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
