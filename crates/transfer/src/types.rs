/// One contiguous range of a compressed blob, addressed by a 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 1-based position within the blob.
    pub index: usize,
    /// Bytes of this range.
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Size of this chunk in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
