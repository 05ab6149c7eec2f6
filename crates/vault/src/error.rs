//! Vault error types.

use repovault_protocol::ProtocolError;
use repovault_registry::RegistryError;
use repovault_remote_store::StoreError;
use repovault_transfer::{CodecError, TransferError};

/// Coarse classification of a [`VaultError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CodecUnavailable,
    CodecFailure,
    ChunkTransferFailure,
    RemoteNotFound,
    RemoteConflict,
    RemoteAuthFailure,
    RegistryCorrupt,
    PreconditionFailure,
    Transport,
    Io,
}

/// Errors surfaced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("no compression backend available")]
    CodecUnavailable,

    #[error("codec failure: {0}")]
    CodecFailure(String),

    #[error("chunk {index} ({path}) failed after {attempts} attempts: {reason}")]
    ChunkTransferFailure {
        index: usize,
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("not found: {0}")]
    RemoteNotFound(String),

    #[error("conflict: {0}")]
    RemoteConflict(String),

    #[error("authorization failed: {0}")]
    RemoteAuthFailure(String),

    /// The registry could not be parsed. `raw` is the document as fetched.
    #[error("registry is corrupt: {reason}")]
    RegistryCorrupt { raw: String, reason: String },

    #[error("precondition failed: {0}")]
    PreconditionFailure(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::CodecUnavailable => ErrorKind::CodecUnavailable,
            VaultError::CodecFailure(_) | VaultError::Json(_) => ErrorKind::CodecFailure,
            VaultError::ChunkTransferFailure { .. } => ErrorKind::ChunkTransferFailure,
            VaultError::RemoteNotFound(_) => ErrorKind::RemoteNotFound,
            VaultError::RemoteConflict(_) => ErrorKind::RemoteConflict,
            VaultError::RemoteAuthFailure(_) => ErrorKind::RemoteAuthFailure,
            VaultError::RegistryCorrupt { .. } => ErrorKind::RegistryCorrupt,
            VaultError::PreconditionFailure(_) => ErrorKind::PreconditionFailure,
            VaultError::Store(_) => ErrorKind::Transport,
            VaultError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => VaultError::RemoteNotFound(path),
            StoreError::Conflict(path) => VaultError::RemoteConflict(path),
            StoreError::Auth { status } => VaultError::RemoteAuthFailure(format!("HTTP {status}")),
            StoreError::InvalidToken => {
                VaultError::RemoteAuthFailure("access token is not a valid header value".into())
            }
            other => VaultError::Store(other),
        }
    }
}

impl From<CodecError> for VaultError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Unavailable(_) => VaultError::CodecUnavailable,
            CodecError::Failure(msg) => VaultError::CodecFailure(msg),
        }
    }
}

impl From<TransferError> for VaultError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::ChunkTransferFailure {
                index,
                path,
                attempts,
                source,
            } => VaultError::ChunkTransferFailure {
                index,
                path,
                attempts,
                reason: source.to_string(),
            },
            TransferError::Store { source, .. } => source.into(),
            TransferError::InvalidChunkSize => {
                VaultError::PreconditionFailure("chunk size must be greater than zero".into())
            }
            TransferError::Codec(c) => c.into(),
        }
    }
}

impl From<ProtocolError> for VaultError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Precondition(msg) => VaultError::PreconditionFailure(msg),
            ProtocolError::Json(e) => VaultError::Json(e),
        }
    }
}

impl From<RegistryError> for VaultError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Corrupt { raw, reason } => VaultError::RegistryCorrupt { raw, reason },
            RegistryError::Conflict { attempts } => VaultError::RemoteConflict(format!(
                "registry still changing after {attempts} attempts"
            )),
            RegistryError::Store(e) => e.into(),
            RegistryError::Protocol(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let cases = [
            (StoreError::NotFound("p".into()), ErrorKind::RemoteNotFound),
            (StoreError::Conflict("p".into()), ErrorKind::RemoteConflict),
            (StoreError::Auth { status: 403 }, ErrorKind::RemoteAuthFailure),
            (StoreError::InvalidToken, ErrorKind::RemoteAuthFailure),
            (StoreError::Transport("x".into()), ErrorKind::Transport),
        ];
        for (store_err, kind) in cases {
            assert_eq!(VaultError::from(store_err).kind(), kind);
        }
    }

    #[test]
    fn exhausted_chunk_keeps_context() {
        let err = VaultError::from(TransferError::ChunkTransferFailure {
            index: 2,
            path: "assets/a/chunk_00002.gz".into(),
            attempts: 3,
            source: StoreError::Transport("reset".into()),
        });
        assert_eq!(err.kind(), ErrorKind::ChunkTransferFailure);
        let msg = err.to_string();
        assert!(msg.contains("chunk 2"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn chunk_not_found_is_remote_not_found() {
        let err = VaultError::from(TransferError::Store {
            index: 1,
            path: "x".into(),
            source: StoreError::NotFound("x".into()),
        });
        assert!(matches!(err, VaultError::RemoteNotFound(p) if p == "x"));
    }

    #[test]
    fn registry_corrupt_keeps_raw() {
        let err = VaultError::from(RegistryError::Corrupt {
            raw: "{bad".into(),
            reason: "EOF".into(),
        });
        assert!(matches!(err, VaultError::RegistryCorrupt { ref raw, .. } if raw == "{bad"));
        assert_eq!(err.kind(), ErrorKind::RegistryCorrupt);
    }

    #[test]
    fn codec_errors_map() {
        assert_eq!(
            VaultError::from(CodecError::Unavailable("none".into())).kind(),
            ErrorKind::CodecUnavailable
        );
        assert_eq!(
            VaultError::from(CodecError::Failure("bad".into())).kind(),
            ErrorKind::CodecFailure
        );
    }

    #[test]
    fn precondition_from_protocol() {
        let err = VaultError::from(ProtocolError::Precondition("missing setting: repo".into()));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailure);
    }
}
