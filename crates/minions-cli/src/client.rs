//! Wiring from configuration to indexer components.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use minions_config::Config;
use minions_config::RedisConfig;
use minions_index::{
    CodebaseIndexer, EmbeddingProvider, IndexerConfig, JsonFileStore, KeyValueStore,
    MemoryStore, MockEmbeddings, OpenAiEmbeddings, RedisSettings, RedisStore,
};
use tracing::{debug, info, warn};

/// Build the embedding provider selected by `config.embeddings.provider`.
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embeddings = &config.embeddings;

    match embeddings.provider.as_str() {
        "mock" => Ok(Arc::new(MockEmbeddings::new(embeddings.dimensions))),
        "openai" => {
            let api_key = embeddings
                .resolve_api_key()
                .context("No API key configured for the openai embedding provider")?;

            let mut provider = OpenAiEmbeddings::new(
                api_key,
                Some(embeddings.model.clone()),
                Some(embeddings.dimensions),
            )
            .with_max_retries(embeddings.max_retries)
            .with_timeout(Duration::from_secs(embeddings.timeout_secs))
            .context("Failed to build HTTP client")?;

            if let Some(base_url) = &embeddings.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(Arc::new(provider))
        }
        other => bail!("Unknown embedding provider: '{}'", other),
    }
}

/// Open the store selected by `config.store.backend`.
///
/// An unreachable Redis server falls back to a process-local memory store,
/// so the index only lives as long as the command.
pub async fn open_store(config: &Config, workspace: &Path) -> Result<Arc<dyn KeyValueStore>> {
    match config.store.backend.as_str() {
        "json" => {
            let path = config.store.resolve_path(workspace);
            debug!("Opening index store at {:?}", path);

            let store = JsonFileStore::open(&path)
                .await
                .with_context(|| format!("Failed to open index store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let settings = redis_settings(&config.store.redis);
            match RedisStore::connect(settings).await {
                Ok(store) => Ok(Arc::new(store)),
                Err(e) => {
                    warn!(
                        "Failed to connect to Redis at {}:{}: {}. Using in-memory store.",
                        config.store.redis.host, config.store.redis.port, e
                    );
                    Ok(Arc::new(MemoryStore::new()))
                }
            }
        }
        other => bail!("Unknown store backend: '{}'", other),
    }
}

fn redis_settings(redis: &RedisConfig) -> RedisSettings {
    RedisSettings {
        host: redis.host.clone(),
        port: redis.port,
        db: redis.db,
        password: redis.password.clone().filter(|p| !p.is_empty()),
    }
}

/// Translate configuration into indexer settings for `workspace`.
pub fn indexer_config(config: &Config, workspace: &Path) -> IndexerConfig {
    let settings = &config.index;
    let mut indexer = IndexerConfig::new(workspace);

    indexer.chunk_size = settings.chunk_size;
    indexer.chunk_overlap = settings.chunk_overlap;
    indexer.max_file_size = settings.max_file_size;
    indexer.respect_gitignore = settings.respect_gitignore;
    if let Some(extensions) = &settings.extensions {
        indexer.extensions = extensions.clone();
    }
    if let Some(ignore_dirs) = &settings.ignore_dirs {
        indexer.ignore_dirs = ignore_dirs.clone();
    }
    indexer
}

/// Build a ready-to-use indexer for `workspace`.
pub async fn build_indexer(
    config: &Config,
    workspace: &Path,
) -> Result<CodebaseIndexer<dyn EmbeddingProvider>> {
    let provider = create_provider(config)?;
    let store = open_store(config, workspace).await?;

    let indexer = CodebaseIndexer::new(indexer_config(config, workspace), provider, store)
        .context("Failed to initialize indexer")?;

    info!(
        "Indexer ready for {:?} (embeddings: {})",
        indexer.workspace_path(),
        config.embeddings.provider
    );
    Ok(indexer)
}
