use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::category::detect_category;
use crate::constants::REGISTRY_VERSION;

/// Current UTC time, truncated to milliseconds like the stored timestamps.
pub fn now_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Space saved by compression, as a percentage with two decimals.
///
/// Returns `"0.00"` for empty input instead of dividing by zero.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> String {
    if original_size == 0 {
        return "0.00".into();
    }
    let ratio = (1.0 - compressed_size as f64 / original_size as f64) * 100.0;
    format!("{ratio:.2}")
}

/// Naming scheme of a file's chunk objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChunkScheme {
    /// `assets/<name>/chunk_00001.gz` plus `assets/<name>/metadata.json`.
    #[default]
    Folder,
}

/// One stored file, as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: String,
    pub chunk_count: usize,
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_scheme: ChunkScheme,
    pub uploaded_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl FileEntry {
    /// Creates an entry for a file whose chunks have all been written.
    pub fn new(
        name: &str,
        original_size: u64,
        compressed_size: u64,
        chunk_count: usize,
        chunk_size: usize,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: detect_category(name).to_string(),
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size, compressed_size),
            chunk_count,
            chunk_size,
            chunk_scheme: ChunkScheme::Folder,
            uploaded_at: now,
            last_updated: now,
        }
    }
}

/// Per-file metadata object stored next to the chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(flatten)]
    pub entry: FileEntry,
    /// Chunk object paths in index order.
    pub chunks: Vec<String>,
}

impl FileMetadata {
    /// Parses a metadata object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes as indented JSON.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// The index of every stored file (`data.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        let now = now_timestamp();
        Self {
            version: REGISTRY_VERSION.into(),
            created_at: now,
            last_updated: now,
            files: Vec::new(),
        }
    }
}

impl Registry {
    /// Parses a registry document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes as indented JSON, the stored form.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Returns the entry with exactly this name.
    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Appends `entry`, or replaces an entry with the same name in place.
    pub fn upsert(&mut self, entry: FileEntry) {
        match self.files.iter_mut().find(|f| f.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.files.push(entry),
        }
        self.last_updated = now_timestamp();
    }

    /// Removes the entry with exactly this name. Returns whether one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        let removed = self.files.len() != before;
        if removed {
            self.last_updated = now_timestamp();
        }
        removed
    }
}

/// Repository coordinates and credential supplied by the settings owner.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .finish()
    }
}

impl Settings {
    /// Checks that every field is present.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let fields = [
            ("token", &self.token),
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("branch", &self.branch),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ProtocolError::Precondition(format!(
                    "missing setting: {field}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> FileEntry {
        FileEntry::new(name, 1000, 400, 1, 1024)
    }

    #[test]
    fn ratio_two_decimals() {
        assert_eq!(compression_ratio(1000, 368), "63.20");
        assert_eq!(compression_ratio(3, 1), "66.67");
    }

    #[test]
    fn ratio_guards_zero_size() {
        assert_eq!(compression_ratio(0, 20), "0.00");
    }

    #[test]
    fn ratio_negative_when_compression_grows() {
        assert_eq!(compression_ratio(10, 30), "-200.00");
    }

    #[test]
    fn file_entry_field_names() {
        let json = serde_json::to_string(&entry("game.iso")).unwrap();
        assert!(json.contains("\"originalSize\":1000"));
        assert!(json.contains("\"compressedSize\":400"));
        assert!(json.contains("\"chunkCount\":1"));
        assert!(json.contains("\"chunkScheme\":\"folder\""));
        assert!(json.contains("\"uploadedAt\""));
        assert!(json.contains("\"category\":\"iso\""));
    }

    #[test]
    fn file_entry_ids_unique() {
        assert_ne!(entry("a").id, entry("a").id);
    }

    #[test]
    fn registry_roundtrip_pretty() {
        let mut reg = Registry::default();
        reg.upsert(entry("a.zip"));
        let bytes = reg.to_json_pretty().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\n  \"files\""));
        let parsed = Registry::from_json(&bytes).unwrap();
        assert_eq!(reg, parsed);
    }

    #[test]
    fn registry_without_files_field_parses() {
        let json = r#"{"version":"1.0","createdAt":"2024-01-01T00:00:00Z","lastUpdated":"2024-01-01T00:00:00Z"}"#;
        let reg = Registry::from_json(json.as_bytes()).unwrap();
        assert!(reg.files.is_empty());
    }

    #[test]
    fn registry_garbage_is_error() {
        assert!(Registry::from_json(b"{not json").is_err());
    }

    #[test]
    fn upsert_preserves_order() {
        let mut reg = Registry::default();
        reg.upsert(entry("e1"));
        reg.upsert(entry("e2"));
        let names: Vec<_> = reg.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["e1", "e2"]);
    }

    #[test]
    fn upsert_replaces_same_name_in_place() {
        let mut reg = Registry::default();
        reg.upsert(entry("e1"));
        reg.upsert(entry("e2"));
        let mut replacement = entry("e1");
        replacement.chunk_count = 9;
        reg.upsert(replacement);
        assert_eq!(reg.files.len(), 2);
        assert_eq!(reg.files[0].name, "e1");
        assert_eq!(reg.files[0].chunk_count, 9);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut reg = Registry::default();
        reg.upsert(entry("keep"));
        let before = reg.last_updated;
        assert!(!reg.remove("other"));
        assert_eq!(reg.files.len(), 1);
        assert_eq!(reg.last_updated, before);
        assert!(reg.remove("keep"));
        assert!(reg.files.is_empty());
    }

    #[test]
    fn metadata_flattens_entry() {
        let meta = FileMetadata {
            entry: entry("x.bin"),
            chunks: vec!["assets/x.bin/chunk_00001.gz".into()],
        };
        let bytes = meta.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["name"], "x.bin");
        assert_eq!(value["chunks"][0], "assets/x.bin/chunk_00001.gz");
        assert_eq!(FileMetadata::from_json(&bytes).unwrap(), meta);
    }

    #[test]
    fn settings_require_all_fields() {
        let mut s = Settings {
            token: "t".into(),
            owner: "o".into(),
            repo: "r".into(),
            branch: "main".into(),
        };
        assert!(s.validate().is_ok());
        s.branch.clear();
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("branch"));
    }

    #[test]
    fn settings_debug_hides_token() {
        let s = Settings {
            token: "ghp_secret".into(),
            ..Default::default()
        };
        assert!(!format!("{s:?}").contains("ghp_secret"));
    }
}
