//! Vault session: settings, collaborators, cached registry and in-flight
//! operation status, passed explicitly to every operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, trace, warn};

use repovault_protocol::{FileEntry, Registry, Settings};
use repovault_registry::RegistryManager;
use repovault_remote_store::{GitHubStore, ObjectStore};
use repovault_transfer::{Codec, TransferEngine};

use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::events::{DownloadState, Phase, ProgressCallback, ProgressEvent, UploadState};
use crate::stats::VaultStats;

/// Builds a [`Vault`] from settings and injected collaborators.
pub struct VaultBuilder {
    settings: Settings,
    config: VaultConfig,
    store: Option<Arc<dyn ObjectStore>>,
    codec: Option<Arc<dyn Codec>>,
}

impl VaultBuilder {
    /// Uses `config` instead of the defaults.
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = config;
        self
    }

    /// Injects the object store. Without one, a contents API client is built
    /// from the settings.
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Injects the compression backend.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validates settings and config and assembles the session.
    ///
    /// Fails with [`VaultError::CodecUnavailable`] when no codec was injected,
    /// before any network activity.
    pub fn build(self) -> Result<Vault, VaultError> {
        self.settings.validate()?;
        self.config.validate()?;
        let codec = self.codec.ok_or(VaultError::CodecUnavailable)?;

        let store: Arc<dyn ObjectStore> = match self.store {
            Some(store) => store,
            None => {
                let mut client = GitHubStore::new(&self.settings)?;
                if let Some(url) = &self.config.api_base_url {
                    client = client.with_base_url(url.as_str());
                }
                Arc::new(client)
            }
        };

        let registry = RegistryManager::new(Arc::clone(&store))
            .with_path(self.config.registry_path.clone())
            .with_max_attempts(self.config.registry_max_attempts);
        let engine = TransferEngine::new(
            Arc::clone(&store),
            self.config.retry,
            self.config.batch_size,
        );

        debug!(
            owner = %self.settings.owner,
            repo = %self.settings.repo,
            branch = %self.settings.branch,
            codec = codec.name(),
            chunk_size = self.config.chunk_size,
            batch_size = engine.batch_size(),
            "vault session ready"
        );

        Ok(Vault {
            settings: self.settings,
            config: self.config,
            store,
            codec,
            registry,
            engine,
            cache: tokio::sync::RwLock::new(None),
            in_flight: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        })
    }
}

/// A session against one repository branch.
pub struct Vault {
    pub(crate) settings: Settings,
    pub(crate) config: VaultConfig,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) registry: RegistryManager,
    pub(crate) engine: TransferEngine,
    cache: tokio::sync::RwLock<Option<Registry>>,
    in_flight: Mutex<HashMap<String, Phase>>,
    listeners: RwLock<Vec<ProgressCallback>>,
}

impl Vault {
    /// Starts building a session for `settings`.
    pub fn builder(settings: Settings) -> VaultBuilder {
        VaultBuilder {
            settings,
            config: VaultConfig::default(),
            store: None,
            codec: None,
        }
    }

    /// Repository settings of this session.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Configuration of this session.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Registers a progress listener.
    pub fn on_progress(&self, callback: ProgressCallback) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(callback);
    }

    /// Files with an operation in progress, and the phase each is in.
    pub fn in_flight(&self) -> Vec<(String, Phase)> {
        let map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut ops: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        ops.sort_by(|a, b| a.0.cmp(&b.0));
        ops
    }

    /// Last registry fetched by this session, for display only.
    ///
    /// May be stale. Writes always re-read the registry first.
    pub async fn cached_registry(&self) -> Option<Registry> {
        self.cache.read().await.clone()
    }

    /// Fetches the registry and returns its files in upload order.
    pub async fn list(&self) -> Result<Vec<FileEntry>, VaultError> {
        let registry = self.refresh().await?;
        Ok(registry.files)
    }

    /// Aggregate statistics over a fresh registry read.
    pub async fn stats(&self) -> Result<VaultStats, VaultError> {
        let registry = self.refresh().await?;
        Ok(VaultStats::from_registry(&registry))
    }

    /// Re-reads the registry and updates the cache.
    pub async fn refresh(&self) -> Result<Registry, VaultError> {
        let registry = self.registry.read_current().await?;
        self.update_cache(registry.clone()).await;
        Ok(registry)
    }

    pub(crate) async fn update_cache(&self, registry: Registry) {
        *self.cache.write().await = Some(registry);
    }

    pub(crate) fn emit(&self, file: &str, phase: Phase, percentage: f64) {
        trace!(file, %phase, percentage, "progress");
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for cb in listeners.iter() {
            cb(ProgressEvent {
                file: file.to_string(),
                phase,
                percentage,
            });
        }
    }

    fn mark(&self, file: &str, phase: Option<Phase>) {
        let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        match phase {
            Some(phase) => {
                map.insert(file.to_string(), phase);
            }
            None => {
                map.remove(file);
            }
        }
    }

    pub(crate) fn begin_upload(&self, file: &str) -> Run<'_, UploadState> {
        Run::start(self, file, UploadState::Idle)
    }

    pub(crate) fn begin_download(&self, file: &str) -> Run<'_, DownloadState> {
        Run::start(self, file, DownloadState::Idle)
    }

    pub(crate) fn begin_delete(&self, file: &str) -> DeleteGuard<'_> {
        self.mark(file, Some(Phase::Delete));
        self.emit(file, Phase::Delete, 0.0);
        DeleteGuard {
            vault: self,
            file: file.to_string(),
        }
    }
}

/// A state machine whose states map onto [`Phase`].
pub(crate) trait OperationState: Copy + PartialEq + std::fmt::Debug {
    fn phase(self) -> Phase;
    fn allows(self, next: Self) -> bool;
}

impl OperationState for UploadState {
    fn phase(self) -> Phase {
        Phase::Upload(self)
    }
    fn allows(self, next: Self) -> bool {
        self.can_transition_to(next)
    }
}

impl OperationState for DownloadState {
    fn phase(self) -> Phase {
        Phase::Download(self)
    }
    fn allows(self, next: Self) -> bool {
        self.can_transition_to(next)
    }
}

/// One running operation. Reports every transition and clears the
/// in-flight entry when dropped.
pub(crate) struct Run<'a, S: OperationState> {
    vault: &'a Vault,
    file: String,
    state: S,
}

impl<'a, S: OperationState> Run<'a, S> {
    fn start(vault: &'a Vault, file: &str, initial: S) -> Self {
        vault.mark(file, Some(initial.phase()));
        Self {
            vault,
            file: file.to_string(),
            state: initial,
        }
    }

    pub(crate) fn state(&self) -> S {
        self.state
    }

    /// Moves to `next` and reports it at `percentage`.
    pub(crate) fn advance(&mut self, next: S, percentage: f64) {
        if !self.state.allows(next) {
            warn!(file = %self.file, from = ?self.state, to = ?next, "unexpected state transition");
        }
        self.state = next;
        self.vault.mark(&self.file, Some(next.phase()));
        self.vault.emit(&self.file, next.phase(), percentage);
    }
}

impl<S: OperationState> Drop for Run<'_, S> {
    fn drop(&mut self) {
        self.vault.mark(&self.file, None);
    }
}

/// Clears the in-flight entry of a delete when dropped.
pub(crate) struct DeleteGuard<'a> {
    vault: &'a Vault,
    file: String,
}

impl Drop for DeleteGuard<'_> {
    fn drop(&mut self) {
        self.vault.emit(&self.file, Phase::Delete, 100.0);
        self.vault.mark(&self.file, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repovault_remote_store::MemoryStore;
    use repovault_transfer::GzipCodec;

    use crate::testing::settings;

    #[test]
    fn build_without_codec_is_unavailable() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let err = Vault::builder(settings()).store(store).build().err().unwrap();
        assert!(matches!(err, VaultError::CodecUnavailable));
    }

    #[test]
    fn build_with_missing_setting_fails() {
        let mut s = settings();
        s.owner.clear();
        let err = Vault::builder(s)
            .codec(Arc::new(GzipCodec::default()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, VaultError::PreconditionFailure(m) if m.contains("owner")));
    }

    #[test]
    fn build_with_default_store() {
        let vault = Vault::builder(settings())
            .codec(Arc::new(GzipCodec::default()))
            .build()
            .unwrap();
        assert_eq!(vault.settings().repo, "r");
        assert_eq!(vault.config().chunk_size, repovault_transfer::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn run_tracks_in_flight_until_dropped() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let vault = Vault::builder(settings())
            .store(store)
            .codec(Arc::new(GzipCodec::default()))
            .build()
            .unwrap();
        {
            let mut run = vault.begin_upload("a.iso");
            run.advance(UploadState::Compressing, 0.0);
            assert_eq!(
                vault.in_flight(),
                vec![("a.iso".to_string(), Phase::Upload(UploadState::Compressing))]
            );
            assert_eq!(run.state(), UploadState::Compressing);
        }
        assert!(vault.in_flight().is_empty());
    }

    #[tokio::test]
    async fn cache_empty_until_refresh() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let vault = Vault::builder(settings())
            .store(store)
            .codec(Arc::new(GzipCodec::default()))
            .build()
            .unwrap();
        assert!(vault.cached_registry().await.is_none());
        vault.refresh().await.unwrap();
        assert!(vault.cached_registry().await.unwrap().files.is_empty());
    }
}
