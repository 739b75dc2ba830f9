//! Codebase indexer orchestrating the full indexing pipeline.
//!
//! Pipeline per file:
//! 1. Read the file (lossy UTF-8) and hash its content
//! 2. Skip it when the stored hash matches
//! 3. Chunk into overlapping line windows
//! 4. Embed all chunks with one batch call
//! 5. Write the new chunk records, then the file record, then delete the
//!    chunks of the superseded record
//!
//! Files are processed one at a time. A per-path async lock keeps two
//! operations on the same file from interleaving within one process.
//! Every public mutating operation ends with a store flush.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::error::IndexError;
use crate::hashing::{content_hash, needs_reindex};
use crate::index_store::{IndexStore, INDEX_PREFIX};
use crate::records::{EmbeddingChunk, IndexStats, IndexedFile, SearchResult};
use crate::similarity::cosine_similarity;
use crate::store::KeyValueStore;
use crate::traversal::{normalize_relative, relative_path, FileFilter};

/// File extensions indexed by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "java", "go", "rs", "cpp", "c", "h", "rb", "php", "swift",
    "kt", "scala", "md", "txt", "json", "yaml", "yml", "html", "css", "scss", "sql",
];

/// Directory names never descended into by default.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
    "env",
    ".env",
    "dist",
    "build",
    "target",
    "out",
    ".idea",
    ".vscode",
    ".cursor",
    ".minions",
];

/// Configuration for the indexer.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Root directory to index
    pub root_path: PathBuf,
    /// File extensions to index (case-insensitive)
    pub extensions: Vec<String>,
    /// Directory names to skip entirely
    pub ignore_dirs: Vec<String>,
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,
    /// Character budget per chunk
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks
    pub chunk_overlap: usize,
    /// Whether to respect .gitignore
    pub respect_gitignore: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            max_file_size: crate::DEFAULT_MAX_FILE_SIZE,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::DEFAULT_CHUNK_OVERLAP,
            respect_gitignore: false,
        }
    }
}

impl IndexerConfig {
    /// Default configuration rooted at `root_path`.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }
}

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// New chunks were embedded and stored
    Indexed { chunks: usize },
    /// Stored hash matched; nothing was written
    Unchanged,
    /// The file produced no chunks
    Empty,
    /// The file was gone from disk and its records were deleted
    Removed,
}

/// Per-file result of an indexing run.
#[derive(Debug)]
pub struct FileOutcome {
    /// Workspace-relative path
    pub path: String,
    pub result: Result<FileStatus, IndexError>,
}

/// Summary of an [`CodebaseIndexer::index`] run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub outcomes: Vec<FileOutcome>,
    /// Paths whose records were removed because the file is gone or no
    /// longer eligible
    pub pruned: Vec<String>,
    /// Records that should have been pruned but could not be. The path is
    /// the store key when the record itself was unreadable.
    pub prune_failures: Vec<FileOutcome>,
    /// Number of batch embedding requests issued
    pub embedding_calls: usize,
    pub duration_ms: u64,
}

impl IndexReport {
    /// True when every eligible file was processed and every stale record
    /// pruned without error.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Failed files followed by failed prunes.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .chain(&self.prune_failures)
            .filter(|o| o.result.is_err())
    }

    /// Number of files that were (re-)embedded.
    pub fn indexed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(FileStatus::Indexed { .. })))
            .count()
    }

    pub fn unchanged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(FileStatus::Unchanged)))
            .count()
    }
}

/// Indexes a workspace into a key-value store and answers similarity queries.
pub struct CodebaseIndexer<E: EmbeddingProvider + ?Sized> {
    root: PathBuf,
    config: IndexerConfig,
    chunker: Chunker,
    filter: FileFilter,
    embeddings: Arc<E>,
    store: IndexStore,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<E: EmbeddingProvider + ?Sized> CodebaseIndexer<E> {
    /// Create a new indexer.
    ///
    /// Fails if the root is missing or not a directory, or if the chunk
    /// settings are invalid.
    pub fn new(
        config: IndexerConfig,
        embeddings: Arc<E>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, IndexError> {
        let root = config.root_path.canonicalize().map_err(|e| {
            IndexError::Config(format!(
                "workspace root {:?} is not accessible: {}",
                config.root_path, e
            ))
        })?;
        if !root.is_dir() {
            return Err(IndexError::Config(format!(
                "workspace root {:?} is not a directory",
                root
            )));
        }

        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let filter = FileFilter::new(
            &config.extensions,
            &config.ignore_dirs,
            config.max_file_size,
            config.respect_gitignore,
        );

        Ok(Self {
            root,
            config,
            chunker,
            filter,
            embeddings,
            store: IndexStore::new(store),
            path_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Canonical absolute workspace root.
    pub fn workspace_path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Eligible files under the workspace root, sorted.
    pub fn get_files_to_index(&self) -> Vec<PathBuf> {
        self.filter.collect(&self.root)
    }

    /// Index every eligible file and prune records of files that are gone.
    ///
    /// Per-file and pruning failures are recorded in the report and do not
    /// stop the run; the outer error only covers the final store flush.
    pub async fn index(&self) -> Result<IndexReport, IndexError> {
        let start = Instant::now();
        let scan_started = Utc::now();
        info!("Starting codebase index of {:?}", self.root);

        let files = self.get_files_to_index();
        info!("Found {} files to index", files.len());

        let mut report = IndexReport::default();
        let mut eligible = HashSet::with_capacity(files.len());

        for path in &files {
            let Some(rel) = relative_path(&self.root, path) else {
                debug!("Skipping {:?}: outside workspace", path);
                continue;
            };
            eligible.insert(rel.clone());

            let result = self
                .index_file(&rel, path, &mut report.embedding_calls)
                .await;
            if let Err(e) = &result {
                warn!("Failed to index {}: {}", rel, e);
            }
            report.outcomes.push(FileOutcome { path: rel, result });
        }

        self.prune(&eligible, scan_started, &mut report).await;
        self.store.flush().await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Indexing complete: {} indexed, {} unchanged, {} failed, {} pruned in {}ms",
            report.indexed_count(),
            report.unchanged_count(),
            report.failures().count(),
            report.pruned.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Rank every stored chunk against `query` and return the best `top_k`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, IndexError> {
        let query_embedding = self.embeddings.embed(query).await?;

        let keys = self.store.chunk_keys().await?;
        debug!("Scoring {} chunks for query", keys.len());

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            // Deleted between listing and reading.
            let Some(chunk) = self.store.get_chunk_by_key(&key).await? else {
                continue;
            };
            let score = cosine_similarity(&query_embedding, &chunk.embedding);
            results.push(SearchResult {
                file_path: chunk.file_path,
                content: chunk.content,
                score,
                line_start: chunk.line_start,
                line_end: chunk.line_end,
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    /// Re-index one file, or remove it from the index if it no longer exists.
    ///
    /// `path` may be workspace-relative or an absolute path under the root.
    pub async fn update(&self, path: impl AsRef<Path>) -> Result<FileStatus, IndexError> {
        let rel = self.resolve(path.as_ref())?;
        let abs = self.root.join(&rel);

        if !abs.is_file() {
            self.remove(&rel).await?;
            return Ok(FileStatus::Removed);
        }

        let mut calls = 0;
        let result = self.index_file(&rel, &abs, &mut calls).await;
        // Rollbacks are buffered too, so flush on failure as well.
        self.store.flush().await?;
        result
    }

    /// Delete a file's record and chunks. Returns `false` if it was not indexed.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<bool, IndexError> {
        let rel = self.resolve(path.as_ref())?;

        let lock = self.path_lock(&rel).await;
        let _guard = lock.lock().await;

        match self.store.get_file(&rel).await? {
            Some(file) => {
                self.drop_file(&file).await?;
                self.store.flush().await?;
                info!("Removed {} from index", rel);
                Ok(true)
            }
            None => {
                debug!("{} is not indexed", rel);
                Ok(false)
            }
        }
    }

    /// Delete every file and chunk record. Returns the number of keys deleted.
    pub async fn clear_index(&self) -> Result<usize, IndexError> {
        let mut keys = self.store.file_keys().await?;
        keys.extend(self.store.chunk_keys().await?);

        let mut deleted = 0;
        for key in &keys {
            if self.store.delete_key(key).await? {
                deleted += 1;
            }
        }
        self.store.flush().await?;

        info!("Cleared {} index keys", deleted);
        Ok(deleted)
    }

    pub async fn get_stats(&self) -> Result<IndexStats, IndexError> {
        Ok(IndexStats {
            indexed_files: self.store.file_keys().await?.len(),
            total_chunks: self.store.chunk_keys().await?.len(),
            workspace_path: self.root.clone(),
        })
    }

    /// Relative paths of every indexed file, sorted.
    pub async fn get_indexed_files(&self) -> Result<Vec<String>, IndexError> {
        let mut paths = Vec::new();
        for key in self.store.file_keys().await? {
            if let Some(file) = self.store.get_file_by_key(&key).await? {
                paths.push(file.file_path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Current on-disk content of a workspace file.
    ///
    /// Returns `None` if the file cannot be read or the path is absolute or
    /// escapes the workspace.
    pub async fn get_file_content(&self, path: &str) -> Option<String> {
        let rel = normalize_relative(Path::new(path))?;
        match tokio::fs::read(self.root.join(&rel)).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!("Cannot read {}: {}", rel, e);
                None
            }
        }
    }

    fn resolve(&self, path: &Path) -> Result<String, IndexError> {
        relative_path(&self.root, path).ok_or_else(|| {
            IndexError::Config(format!("{:?} is not a path inside the workspace", path))
        })
    }

    async fn path_lock(&self, rel: &str) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().await;
        Arc::clone(locks.entry(rel.to_string()).or_default())
    }

    async fn index_file(
        &self,
        rel: &str,
        abs: &Path,
        embedding_calls: &mut usize,
    ) -> Result<FileStatus, IndexError> {
        let lock = self.path_lock(rel).await;
        let _guard = lock.lock().await;

        let bytes = tokio::fs::read(abs)
            .await
            .map_err(|e| IndexError::io(abs, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let hash = content_hash(&content);

        let existing = match self.store.get_file(rel).await {
            Ok(existing) => existing,
            Err(e @ IndexError::CorruptRecord { .. }) => {
                warn!("Overwriting unreadable record for {}: {}", rel, e);
                None
            }
            Err(e) => return Err(e),
        };

        if !needs_reindex(existing.as_ref().map(|f| f.content_hash.as_str()), &hash) {
            debug!("Skipping {}: unchanged", rel);
            return Ok(FileStatus::Unchanged);
        }

        let chunks = self.chunker.split(&content);
        if chunks.is_empty() {
            if let Some(stale) = &existing {
                self.drop_file(stale).await?;
                debug!("{} is now empty, removed stale records", rel);
            }
            return Ok(FileStatus::Empty);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        *embedding_calls += 1;
        let embeddings = self.embeddings.embed_batch(&texts).await?;
        self.validate_embeddings(texts.len(), &embeddings)?;

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let record = EmbeddingChunk {
                chunk_id: Uuid::new_v4().to_string(),
                file_path: rel.to_string(),
                content: chunk.text,
                embedding,
                line_start: chunk.line_start,
                line_end: chunk.line_end,
            };
            if let Err(e) = self.store.put_chunk(&record).await {
                self.rollback(rel, &chunk_ids).await;
                return Err(e);
            }
            chunk_ids.push(record.chunk_id);
        }

        let count = chunk_ids.len();
        let file = IndexedFile::new(rel.to_string(), hash, chunk_ids);
        if let Err(e) = self.store.put_file(&file).await {
            self.rollback(rel, &file.chunk_ids).await;
            return Err(e);
        }

        // The new record is already in place, so a failure here only
        // leaves orphans behind; the file itself is indexed.
        if let Some(stale) = existing {
            match self.store.delete_chunks(&stale.chunk_ids).await {
                Ok(deleted) => debug!("Deleted {} stale chunks of {}", deleted, rel),
                Err(e) => warn!(
                    "Failed to delete {} stale chunks of {}: {}",
                    stale.chunk_ids.len(),
                    rel,
                    e
                ),
            }
        }

        info!("Indexed {} ({} chunks)", rel, count);
        Ok(FileStatus::Indexed { chunks: count })
    }

    fn validate_embeddings(
        &self,
        expected: usize,
        embeddings: &[Vec<f32>],
    ) -> Result<(), EmbeddingError> {
        if embeddings.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                embeddings.len()
            )));
        }

        let dimensions = self.embeddings.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }
        Ok(())
    }

    async fn rollback(&self, rel: &str, chunk_ids: &[String]) {
        if let Err(e) = self.store.delete_chunks(chunk_ids).await {
            warn!("Rollback of {} new chunks for {} failed: {}", chunk_ids.len(), rel, e);
        }
    }

    /// Delete a file's chunks, then its record.
    async fn drop_file(&self, file: &IndexedFile) -> Result<(), IndexError> {
        self.store.delete_chunks(&file.chunk_ids).await?;
        self.store.delete_file(&file.file_path).await?;
        Ok(())
    }

    /// Remove records whose file is no longer in `eligible`.
    ///
    /// The set was built when the scan started, so each candidate is
    /// re-read under its path lock and kept if it was written after
    /// `scan_started` by a concurrent `update`.
    async fn prune(
        &self,
        eligible: &HashSet<String>,
        scan_started: DateTime<Utc>,
        report: &mut IndexReport,
    ) {
        let keys = match self.store.file_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cannot list index records for pruning: {}", e);
                report.prune_failures.push(FileOutcome {
                    path: format!("{}*", INDEX_PREFIX),
                    result: Err(e),
                });
                return;
            }
        };

        for key in keys {
            let snapshot = match self.store.get_file_by_key(&key).await {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping unreadable index record {}: {}", key, e);
                    if let Err(e) = self.store.delete_key(&key).await {
                        report.prune_failures.push(FileOutcome {
                            path: key,
                            result: Err(e),
                        });
                    }
                    continue;
                }
            };

            if eligible.contains(&snapshot.file_path) {
                continue;
            }

            let rel = snapshot.file_path;
            match self.prune_file(&rel, scan_started).await {
                Ok(true) => {
                    debug!("Pruned {} from index", rel);
                    report.pruned.push(rel);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to prune {}: {}", rel, e);
                    report.prune_failures.push(FileOutcome {
                        path: rel,
                        result: Err(e),
                    });
                }
            }
        }

        report.pruned.sort();
    }

    /// Drop the current record of `rel` unless it is gone or newer than the
    /// scan. Returns whether anything was dropped.
    async fn prune_file(&self, rel: &str, scan_started: DateTime<Utc>) -> Result<bool, IndexError> {
        let lock = self.path_lock(rel).await;
        let _guard = lock.lock().await;

        let Some(current) = self.store.get_file(rel).await? else {
            return Ok(false);
        };
        if current.indexed_at >= scan_started {
            debug!("Keeping {}: re-indexed since the scan started", rel);
            return Ok(false);
        }

        self.drop_file(&current).await?;
        Ok(true)
    }
}
