//! Remote object store client.
//!
//! The repository contents API is modelled as a path-addressed store with
//! three single-object operations. Every object carries an opaque
//! concurrency token (the blob SHA); overwriting or deleting an object
//! requires the token of its current version.
//!
//! [`GitHubStore`] talks to the real REST endpoint, [`MemoryStore`] keeps
//! objects in process with the same token rules.

use std::future::Future;
use std::pin::Pin;

pub mod github;
pub mod memory;

pub use github::GitHubStore;
pub use memory::{FaultOp, MemoryStore};

/// Errors from a remote object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: stale or missing token for {0}")]
    Conflict(String),

    #[error("authorization failed ({status})")]
    Auth { status: u16 },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid access token")]
    InvalidToken,
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Http(_) | StoreError::Transport(_) | StoreError::RateLimited(_) => true,
            StoreError::Api { status, .. } => *status >= 500,
            StoreError::NotFound(_)
            | StoreError::Conflict(_)
            | StoreError::Auth { .. }
            | StoreError::Decode(_)
            | StoreError::InvalidToken => false,
        }
    }
}

/// Content and concurrency token of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub content: Vec<u8>,
    pub token: String,
}

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Path-addressed content store with optimistic concurrency.
///
/// Object-safe so orchestrators can hold an `Arc<dyn ObjectStore>` and tests
/// can swap in [`MemoryStore`].
pub trait ObjectStore: Send + Sync {
    /// Fetches an object. Missing objects yield [`StoreError::NotFound`].
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, RemoteObject>;

    /// Creates (`token == None`) or overwrites an object and returns its new token.
    ///
    /// A missing or stale token on an existing object yields [`StoreError::Conflict`].
    fn put<'a>(
        &'a self,
        path: &'a str,
        content: &'a [u8],
        token: Option<&'a str>,
        message: &'a str,
    ) -> StoreFuture<'a, String>;

    /// Deletes an object at the version identified by `token`.
    fn delete<'a>(&'a self, path: &'a str, token: &'a str, message: &'a str)
    -> StoreFuture<'a, ()>;
}

/// Returns the current token of `path`, or `None` if the object does not exist.
pub async fn current_token(
    store: &dyn ObjectStore,
    path: &str,
) -> Result<Option<String>, StoreError> {
    match store.get(path).await {
        Ok(obj) => Ok(Some(obj.token)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Writes `content` to `path`, creating it or overwriting the current version.
pub async fn put_replacing(
    store: &dyn ObjectStore,
    path: &str,
    content: &[u8],
    message: &str,
) -> Result<String, StoreError> {
    let token = current_token(store, path).await?;
    store.put(path, content, token.as_deref(), message).await
}

/// Fetches `path` and deletes it at that version.
///
/// Returns `Ok(false)` when the object was already absent.
pub async fn delete_if_present(
    store: &dyn ObjectStore,
    path: &str,
    message: &str,
) -> Result<bool, StoreError> {
    let Some(token) = current_token(store, path).await? else {
        return Ok(false);
    };
    match store.delete(path, &token, message).await {
        Ok(()) => Ok(true),
        Err(StoreError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
