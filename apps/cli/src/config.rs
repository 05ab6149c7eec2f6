//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/repovault/config.toml`
//! - Windows: `%APPDATA%/repovault/config.toml`
//!
//! The file may hold the access token, so it is written with mode 0600 on
//! Unix. `REPOVAULT_TOKEN` and command-line flags take precedence over it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use repovault_protocol::Settings;
use repovault_vault::{DEFAULT_MAX_FILE_SIZE, VaultConfig};

/// Environment variable that overrides the stored token.
pub const TOKEN_ENV: &str = "REPOVAULT_TOKEN";

const MIB: usize = 1024 * 1024;

/// Persisted CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Repository owner (user or organization).
    #[serde(default)]
    pub owner: String,

    /// Repository name.
    #[serde(default)]
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Personal access token. Prefer `REPOVAULT_TOKEN`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    /// Chunk size in MiB.
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: usize,

    /// Chunks transferred at once.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Largest accepted input file in MiB.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// API endpoint, for GitHub Enterprise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

fn default_branch() -> String {
    "main".into()
}

fn default_chunk_size_mb() -> usize {
    repovault_transfer::DEFAULT_CHUNK_SIZE / MIB
}

fn default_batch_size() -> usize {
    repovault_transfer::DEFAULT_BATCH_SIZE
}

fn default_max_file_size_mb() -> u64 {
    DEFAULT_MAX_FILE_SIZE / MIB as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            token: String::new(),
            chunk_size_mb: default_chunk_size_mb(),
            batch_size: default_batch_size(),
            max_file_size_mb: default_max_file_size_mb(),
            api_base_url: None,
        }
    }
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub token: Option<String>,
}

impl Config {
    /// Loads configuration from `path`, or defaults if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line values over the file values.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(owner) = overrides.owner {
            self.owner = owner;
        }
        if let Some(repo) = overrides.repo {
            self.repo = repo;
        }
        if let Some(branch) = overrides.branch {
            self.branch = branch;
        }
        if let Some(token) = overrides.token {
            self.token = token;
        }
    }

    /// Repository settings. `env_token` (from [`TOKEN_ENV`]) replaces the
    /// stored token when set and non-empty.
    pub fn settings(&self, env_token: Option<String>) -> Settings {
        let token = env_token
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.token.clone());
        Settings {
            token,
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
        }
    }

    /// Session tuning derived from this file.
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            chunk_size: self.chunk_size_mb.saturating_mul(MIB),
            batch_size: self.batch_size,
            max_file_size: self.max_file_size_mb.saturating_mul(MIB as u64),
            api_base_url: self.api_base_url.clone(),
            ..VaultConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata).join("repovault").join("config.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("repovault")
            .join("config.toml"))
    }
}
