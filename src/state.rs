use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::derived::{compute_available, standard_specs};
use crate::config::PipelineConfig;
use crate::data::cache::DatasetCache;
use crate::data::filter::{apply, FilterSpec};
use crate::data::model::Dataset;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Which screen the front end shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Loading,
    Dashboard,
}

/// The full session state, independent of rendering.
#[derive(Debug)]
pub struct AppState {
    pub phase: AppPhase,

    /// File the dashboard reads.
    pub source: PathBuf,

    /// Owns the normalized dataset.
    pub cache: DatasetCache,

    /// Normalized dataset enriched with the standard derived series
    /// (None until the dashboard is launched).
    pub dataset: Option<Arc<Dataset>>,

    /// Names of derived series that could not be computed.
    pub skipped_series: Vec<String>,

    /// Current sidebar selection.
    pub filters: FilterSpec,

    /// Dataset after applying `filters` (cached).
    pub view: Dataset,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(source: impl AsRef<Path>, config: PipelineConfig) -> Self {
        Self {
            phase: AppPhase::Loading,
            source: source.as_ref().to_path_buf(),
            cache: DatasetCache::new(config),
            dataset: None,
            skipped_series: Vec::new(),
            filters: FilterSpec::default(),
            view: Dataset::default(),
            status_message: None,
        }
    }

    /// The single Loading → Dashboard transition. Loads (or reuses) the
    /// canonical dataset; on failure the phase stays `Loading` and the error
    /// is kept in `status_message`.
    pub fn launch_dashboard(&mut self) -> Result<()> {
        if self.phase == AppPhase::Dashboard {
            return Ok(());
        }
        match self.cache.get_or_load(&self.source) {
            Ok(normalized) => {
                self.set_dataset(&normalized);
                self.phase = AppPhase::Dashboard;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load {}: {e}", self.source.display());
                self.status_message = Some(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    /// Rebuild from disk, keeping the current filter selection.
    pub fn reload(&mut self) -> Result<()> {
        let normalized = self.cache.reload(&self.source)?;
        self.set_dataset(&normalized);
        Ok(())
    }

    /// Replace the sidebar selection and recompute the view. An invalid
    /// selection leaves the previous one in place.
    pub fn set_filter(&mut self, spec: FilterSpec) -> Result<()> {
        spec.validate()?;
        self.filters = spec;
        self.refilter()
    }

    /// Recompute `view` after a filter or dataset change.
    pub fn refilter(&mut self) -> Result<()> {
        if let Some(ds) = &self.dataset {
            self.view = apply(ds, &self.filters)?;
        }
        Ok(())
    }

    fn set_dataset(&mut self, normalized: &Dataset) {
        let lag = self.cache.config().growth_lag;
        let (enriched, skipped) = compute_available(normalized, &standard_specs(lag));
        self.skipped_series = skipped.into_iter().map(|(name, _)| name).collect();
        self.dataset = Some(Arc::new(enriched));
        self.status_message = None;
        if let Err(e) = self.refilter() {
            log::warn!("Filter reset after reload: {e}");
            self.filters = FilterSpec::default();
            self.view = self.dataset.as_deref().cloned().unwrap_or_default();
        }
    }
}
