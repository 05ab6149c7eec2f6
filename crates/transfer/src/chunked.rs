use crate::TransferError;
use crate::types::Chunk;

/// Number of chunks a blob of `len` bytes splits into.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Splits `blob` into consecutive chunks of `chunk_size` bytes.
///
/// The last chunk holds the remainder. An empty blob yields no chunks.
pub fn split(blob: &[u8], chunk_size: usize) -> Result<Vec<Chunk<'_>>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    Ok(blob
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, data)| Chunk {
            index: i + 1,
            data,
        })
        .collect())
}

/// Concatenates `parts` in the order given.
pub fn merge<T: AsRef<[u8]>>(parts: &[T]) -> Vec<u8> {
    let total = parts.iter().map(|p| p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}
