/// Path of the registry document at the repository root.
pub const REGISTRY_PATH: &str = "data.json";

/// Folder holding every per-file chunk folder.
pub const ASSETS_PREFIX: &str = "assets";

/// Name of the per-file metadata object inside its chunk folder.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Registry schema version written into new documents.
pub const REGISTRY_VERSION: &str = "1.0";

/// Zero-padded width of chunk sequence numbers (`chunk_00001.gz`).
pub const CHUNK_INDEX_WIDTH: usize = 5;

/// Extension of stored chunk objects.
pub const CHUNK_EXTENSION: &str = "gz";
