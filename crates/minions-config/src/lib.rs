//! Configuration for the minions codebase index.
//!
//! Sources are layered, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. `~/.config/minions/config.toml`
//! 3. An explicit `--config` file, or `<workspace>/minions.toml`
//! 4. `MINIONS__SECTION__KEY` environment variables

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the per-workspace config file
pub const WORKSPACE_CONFIG_FILE: &str = "minions.toml";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "MINIONS";

/// State directory inside the workspace
pub const STATE_DIR_NAME: &str = ".minions";

/// Default store file name inside [`STATE_DIR_NAME`]
pub const STORE_FILE: &str = "index.json";

/// Environment variable consulted when no API key is configured
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const KNOWN_PROVIDERS: &[&str] = &["mock", "openai"];

const KNOWN_BACKENDS: &[&str] = &["json", "redis"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexSettings,
    pub embeddings: EmbeddingsConfig,
    pub store: StoreConfig,
}

/// Traversal and chunking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_file_size: u64,
    /// Replaces the built-in extension allowlist when set
    pub extensions: Option<Vec<String>>,
    /// Replaces the built-in directory denylist when set
    pub ignore_dirs: Option<Vec<String>>,
    pub respect_gitignore: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
            max_file_size: 1024 * 1024,
            extensions: None,
            ignore_dirs: None,
            respect_gitignore: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// `mock` or `openai`
    pub provider: String,
    /// Literal key or `${ENV_VAR}` reference
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub base_url: Option<String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            base_url: None,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingsConfig {
    /// Resolve the API key from the process environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key, looking variables up with `lookup`.
    ///
    /// `${VAR}` values are expanded; an unset key falls back to
    /// `OPENAI_API_KEY`. Empty results count as missing.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = match self.api_key.as_deref() {
            Some(key) if key.starts_with("${") && key.ends_with('}') => {
                lookup(&key[2..key.len() - 1])
            }
            Some(key) if !key.is_empty() => Some(key.to_string()),
            _ => lookup(OPENAI_API_KEY_ENV),
        };
        resolved.filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `json` or `redis`
    pub backend: String,
    /// Path of the JSON index file; `~` is expanded and relative paths are
    /// taken from the workspace
    pub path: Option<String>,
    pub redis: RedisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "json".to_string(),
            path: None,
            redis: RedisConfig::default(),
        }
    }
}

/// Connection settings for the `redis` backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl StoreConfig {
    pub fn resolve_path(&self, workspace: &Path) -> PathBuf {
        match &self.path {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
                if expanded.is_absolute() {
                    expanded
                } else {
                    workspace.join(expanded)
                }
            }
            None => workspace.join(STATE_DIR_NAME).join(STORE_FILE),
        }
    }
}

/// A configuration value that cannot be used.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("index.chunk_size must be > 0")]
    ZeroChunkSize,

    #[error("embeddings.dimensions must be > 0")]
    ZeroDimensions,

    #[error("Unknown embedding provider: '{0}'. Must be mock or openai.")]
    UnknownProvider(String),

    #[error("embeddings.api_key (or OPENAI_API_KEY) must be set when provider is 'openai'")]
    MissingApiKey,

    #[error("Unknown store backend: '{0}'. Must be json or redis.")]
    UnknownBackend(String),
}

impl Config {
    /// Load the layered configuration for `workspace`.
    pub fn load(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        let mut loader = ConfigLoader::new(workspace);
        if let Some(path) = explicit {
            loader = loader.with_file(path);
        }
        loader.load()
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_with(|name| std::env::var(name).ok())
    }

    pub fn validate_with<F>(&self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.index.chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }
        if self.embeddings.dimensions == 0 {
            return Err(ValidationError::ZeroDimensions);
        }

        let provider = self.embeddings.provider.as_str();
        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(ValidationError::UnknownProvider(provider.to_string()));
        }
        if provider == "openai" && self.embeddings.resolve_api_key_with(lookup).is_none() {
            return Err(ValidationError::MissingApiKey);
        }

        let backend = self.store.backend.as_str();
        if !KNOWN_BACKENDS.contains(&backend) {
            return Err(ValidationError::UnknownBackend(backend.to_string()));
        }
        Ok(())
    }

    /// Render as TOML, e.g. to show the effective configuration.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Builder for the layered configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    workspace: PathBuf,
    explicit: Option<PathBuf>,
    user_config: Option<PathBuf>,
    env: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            explicit: None,
            user_config: default_user_config_path(),
            env: None,
        }
    }

    /// Use this file instead of `<workspace>/minions.toml`. It must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Override (or disable with `None`) the user-level config file.
    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: config::Map<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn load(self) -> Result<Config> {
        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to build default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(user) = &self.user_config {
            builder = builder.add_source(config::File::from(user.as_path()).required(false));
        }

        builder = match &self.explicit {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(
                config::File::from(self.workspace.join(WORKSPACE_CONFIG_FILE)).required(false),
            ),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("index.extensions")
                .with_list_parse_key("index.ignore_dirs")
                .source(self.env),
        );

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }
}

/// `~/.config/minions/config.toml`
pub fn default_user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("minions").join("config.toml"))
}
