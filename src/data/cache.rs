use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::loader::load_bytes;
use super::model::Dataset;
use crate::config::PipelineConfig;
use crate::error::Result;

/// Identity of a loaded source: where it came from and what it contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceId {
    pub path: PathBuf,
    /// Hex SHA-256 of the file content at load time.
    pub digest: String,
}

impl SourceId {
    fn of(path: &Path, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            path: path.to_path_buf(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }
}

/// Owns the canonical dataset for the lifetime of the process.
///
/// The dataset is built once per source and shared read-only through an
/// `Arc`; it is rebuilt only by an explicit [`reload`](Self::reload) or after
/// [`invalidate`](Self::invalidate).
#[derive(Debug, Default)]
pub struct DatasetCache {
    config: PipelineConfig,
    entry: Option<(SourceId, Arc<Dataset>)>,
}

impl DatasetCache {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            entry: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Cached dataset for `path`, loading it on first use. A different path
    /// replaces the cached entry.
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<Dataset>> {
        if let Some((source, dataset)) = &self.entry {
            if source.path == path {
                log::debug!("Dataset cache hit for {}", path.display());
                return Ok(Arc::clone(dataset));
            }
        }
        log::debug!("Dataset cache miss for {}", path.display());
        self.reload(path)
    }

    /// Re-read and rebuild unconditionally.
    pub fn reload(&mut self, path: &Path) -> Result<Arc<Dataset>> {
        let bytes = std::fs::read(path)?;
        let source = SourceId::of(path, &bytes);
        let dataset = Arc::new(load_bytes(path, &bytes, &self.config)?);
        log::info!(
            "Cached {} rows from {} (sha256 {})",
            dataset.len(),
            path.display(),
            &source.digest[..12]
        );
        self.entry = Some((source, Arc::clone(&dataset)));
        Ok(dataset)
    }

    /// Drop the cached dataset. Outstanding `Arc`s stay valid.
    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            log::info!("Dataset cache invalidated");
        }
    }

    pub fn source(&self) -> Option<&SourceId> {
        self.entry.as_ref().map(|(s, _)| s)
    }

    pub fn dataset(&self) -> Option<Arc<Dataset>> {
        self.entry.as_ref().map(|(_, d)| Arc::clone(d))
    }

    /// Whether the file on disk no longer matches the cached content.
    /// An unreadable file counts as stale.
    pub fn is_stale(&self) -> bool {
        match &self.entry {
            None => false,
            Some((source, _)) => match std::fs::read(&source.path) {
                Ok(bytes) => SourceId::of(&source.path, &bytes) != *source,
                Err(_) => true,
            },
        }
    }
}
