//! In-process object store with token checking and fault injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::{ObjectStore, RemoteObject, StoreError, StoreFuture};

/// Operation targeted by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Get,
    Put,
    Delete,
}

struct Fault {
    remaining: usize,
    make: fn(&str) -> StoreError,
}

#[derive(Default)]
struct MemoryInner {
    objects: BTreeMap<String, Vec<u8>>,
    faults: HashMap<(FaultOp, String), Fault>,
    tamper: HashMap<String, Vec<u8>>,
    calls: HashMap<FaultOp, usize>,
}

/// Object store held in memory.
///
/// Tokens are the SHA-256 of the content, so any change of content changes
/// the token. Follows the same conflict rules as the remote API.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

fn token_for(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn transport_fault(path: &str) -> StoreError {
    StoreError::Transport(format!("injected fault on {path}"))
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `times` calls of `op` on `path` fail with a transport error.
    pub fn fail_next(&self, op: FaultOp, path: &str, times: usize) {
        self.fail_next_with(op, path, times, transport_fault);
    }

    /// Makes the next `times` calls of `op` on `path` fail with `make(path)`.
    pub fn fail_next_with(
        &self,
        op: FaultOp,
        path: &str,
        times: usize,
        make: fn(&str) -> StoreError,
    ) {
        self.lock().faults.insert(
            (op, path.to_string()),
            Fault {
                remaining: times,
                make,
            },
        );
    }

    /// Replaces the content of `path` right before the next put to it lands,
    /// as if another writer got there first.
    pub fn tamper_before_next_put(&self, path: &str, content: Vec<u8>) {
        self.lock().tamper.insert(path.to_string(), content);
    }

    /// Stores `content` directly, bypassing token checks.
    pub fn insert(&self, path: &str, content: Vec<u8>) {
        self.lock().objects.insert(path.to_string(), content);
    }

    /// Returns the stored content of `path`.
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).cloned()
    }

    /// Whether `path` exists.
    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Number of calls of `op` received so far, failed ones included.
    pub fn calls(&self, op: FaultOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn begin(inner: &mut MemoryInner, op: FaultOp, path: &str) -> Result<(), StoreError> {
        *inner.calls.entry(op).or_default() += 1;
        let key = (op, path.to_string());
        if let Some(fault) = inner.faults.get_mut(&key)
            && fault.remaining > 0
        {
            fault.remaining -= 1;
            let err = (fault.make)(path);
            if fault.remaining == 0 {
                inner.faults.remove(&key);
            }
            trace!(path, ?op, "injected fault");
            return Err(err);
        }
        Ok(())
    }

    fn get_now(&self, path: &str) -> Result<RemoteObject, StoreError> {
        let mut inner = self.lock();
        Self::begin(&mut inner, FaultOp::Get, path)?;
        inner
            .objects
            .get(path)
            .map(|content| RemoteObject {
                token: token_for(content),
                content: content.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn put_now(
        &self,
        path: &str,
        content: &[u8],
        token: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut inner = self.lock();
        Self::begin(&mut inner, FaultOp::Put, path)?;
        if let Some(other) = inner.tamper.remove(path) {
            inner.objects.insert(path.to_string(), other);
        }

        let current = inner.objects.get(path).map(|c| token_for(c));
        match (current.as_deref(), token) {
            (None, None) => {}
            (Some(cur), Some(given)) if cur == given => {}
            _ => return Err(StoreError::Conflict(path.to_string())),
        }

        inner.objects.insert(path.to_string(), content.to_vec());
        Ok(token_for(content))
    }

    fn delete_now(&self, path: &str, token: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::begin(&mut inner, FaultOp::Delete, path)?;
        let Some(content) = inner.objects.get(path) else {
            return Err(StoreError::NotFound(path.to_string()));
        };
        if token_for(content) != token {
            return Err(StoreError::Conflict(path.to_string()));
        }
        inner.objects.remove(path);
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, RemoteObject> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.get_now(path)
        })
    }

    fn put<'a>(
        &'a self,
        path: &'a str,
        content: &'a [u8],
        token: Option<&'a str>,
        _message: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.put_now(path, content, token)
        })
    }

    fn delete<'a>(
        &'a self,
        path: &'a str,
        token: &'a str,
        _message: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.delete_now(path, token)
        })
    }
}
