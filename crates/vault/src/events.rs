//! Operation states and progress events.

use std::fmt;

/// Upload state machine.
///
/// `Idle → Compressing → Chunking → Transferring → RegisteringMetadata → Done`,
/// with `Failed` reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Compressing,
    Chunking,
    Transferring,
    RegisteringMetadata,
    Done,
    Failed,
}

impl UploadState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Idle, Compressing)
                | (Compressing, Chunking)
                | (Chunking, Transferring)
                | (Transferring, RegisteringMetadata)
                | (RegisteringMetadata, Done)
        ) || (next == Failed && self != Failed)
    }
}

/// Download state machine.
///
/// `Idle → LookupMetadata → Transferring → Merging → Decompressing → Done`,
/// with `Failed` reachable from any state except `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    LookupMetadata,
    Transferring,
    Merging,
    Decompressing,
    Done,
    Failed,
}

impl DownloadState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: DownloadState) -> bool {
        use DownloadState::*;
        matches!(
            (self, next),
            (Idle, LookupMetadata)
                | (LookupMetadata, Transferring)
                | (Transferring, Merging)
                | (Merging, Decompressing)
                | (Decompressing, Done)
        ) || (next == Failed && !matches!(self, Done | Failed))
    }
}

/// Phase of a running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Upload(UploadState),
    Download(DownloadState),
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Upload(s) => write!(f, "upload:{s:?}"),
            Phase::Download(s) => write!(f, "download:{s:?}"),
            Phase::Delete => f.write_str("delete"),
        }
    }
}

/// Progress notification sent to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// File the operation works on.
    pub file: String,
    pub phase: Phase,
    /// Overall completion, 0.0–100.0.
    pub percentage: f64,
}

/// Callback invoked with progress events.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;
