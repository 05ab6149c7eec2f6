//! Aggregate statistics over the registry.

use std::collections::BTreeMap;

use serde::Serialize;

use repovault_protocol::{Registry, compression_ratio};

/// Totals over every registered file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStats {
    pub file_count: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub total_chunks: usize,
    /// Space saved over all files, two decimals.
    pub compression_ratio: String,
    /// Number of files per category tag.
    pub by_category: BTreeMap<String, usize>,
}

impl VaultStats {
    pub fn from_registry(registry: &Registry) -> Self {
        let mut stats = VaultStats::default();
        for entry in &registry.files {
            stats.file_count += 1;
            stats.total_original_size += entry.original_size;
            stats.total_compressed_size += entry.compressed_size;
            stats.total_chunks += entry.chunk_count;
            *stats.by_category.entry(entry.category.clone()).or_default() += 1;
        }
        stats.compression_ratio =
            compression_ratio(stats.total_original_size, stats.total_compressed_size);
        stats
    }
}

#[cfg(test)]
mod tests {
    use repovault_protocol::FileEntry;

    use super::*;
    use crate::config::VaultConfig;
    use crate::testing::memory_vault;

    #[test]
    fn empty_registry() {
        let stats = VaultStats::from_registry(&Registry::default());
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.compression_ratio, "0.00");
        assert!(stats.by_category.is_empty());
    }

    #[test]
    fn totals_and_categories() {
        let mut registry = Registry::default();
        registry.upsert(FileEntry::new("a.iso", 1000, 400, 2, 256));
        registry.upsert(FileEntry::new("b.ISO", 1000, 600, 3, 256));
        registry.upsert(FileEntry::new("notes", 0, 20, 1, 256));

        let stats = VaultStats::from_registry(&registry);
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_original_size, 2000);
        assert_eq!(stats.total_compressed_size, 1020);
        assert_eq!(stats.total_chunks, 6);
        assert_eq!(stats.compression_ratio, "49.00");
        assert_eq!(stats.by_category.get("iso"), Some(&2));
        assert_eq!(stats.by_category.get("other"), Some(&1));
    }

    #[tokio::test]
    async fn stats_reads_fresh_registry() {
        let (_store, vault) = memory_vault(VaultConfig::default());
        vault.upload("a.mp3", b"la la la".to_vec()).await.unwrap();
        let stats = vault.stats().await.unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.by_category.get("audio"), Some(&1));
    }
}
