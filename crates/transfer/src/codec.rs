use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Errors from a compression backend.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no compression backend available: {0}")]
    Unavailable(String),

    #[error("codec failure: {0}")]
    Failure(String),
}

/// A gzip-format compression backend.
///
/// `decompress(compress(x)) == x` must hold for every input, the empty one
/// included.
pub trait Codec: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Compresses `data` into a gzip stream.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decompresses a gzip stream. Malformed input yields [`CodecError::Failure`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Gzip backend built on `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    /// Creates a codec with the given level (clamped to 0..=9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    /// Compression level in use.
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Failure(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CodecError::Failure(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Failure(format!("malformed gzip stream: {e}")))?;
        Ok(out)
    }
}

/// Runs [`Codec::compress`] on the blocking pool.
pub async fn compress_blocking(codec: Arc<dyn Codec>, data: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    tokio::task::spawn_blocking(move || codec.compress(&data))
        .await
        .map_err(|e| CodecError::Failure(format!("task join error: {e}")))?
}

/// Runs [`Codec::decompress`] on the blocking pool.
pub async fn decompress_blocking(
    codec: Arc<dyn Codec>,
    data: Vec<u8>,
) -> Result<Vec<u8>, CodecError> {
    tokio::task::spawn_blocking(move || codec.decompress(&data))
        .await
        .map_err(|e| CodecError::Failure(format!("task join error: {e}")))?
}
