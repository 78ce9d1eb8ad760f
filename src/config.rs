use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::data::model::SeriesKey;
use crate::error::Result;

/// Pipeline settings. Every field has a default, so an empty JSON object
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// chrono format strings, tried in order for every date cell.
    pub date_formats: Vec<String>,
    /// Field delimiter of delimited input.
    pub delimiter: char,
    /// Lag (in periods) of the year-over-year growth series.
    pub growth_lag: usize,
    /// Series whose absence from the header row fails the load.
    pub required_series: Vec<SeriesKey>,
    /// Additional header texts per semantic key, merged into the built-in
    /// mapping table. Keys are semantic key names such as `"m1"`.
    pub header_aliases: BTreeMap<String, Vec<String>>,
    /// Header texts accepted for the date column.
    pub date_headers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_formats: [
                "%Y-%m-%d",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
                "%d/%m/%Y",
                "%m/%d/%Y",
                "%Y/%m/%d",
                "%d-%b-%Y",
                "%d %B %Y",
                "%b-%Y",
                "%B %Y",
                "%Y-%m",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            delimiter: ',',
            growth_lag: 12,
            required_series: vec![SeriesKey::M0, SeriesKey::M1, SeriesKey::M2, SeriesKey::M2b],
            header_aliases: BTreeMap::new(),
            date_headers: vec!["Date".to_string(), "Month".to_string(), "Period".to_string()],
        }
    }
}

/// Load a configuration file (JSON).
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&content)?;
    log::debug!("Loaded pipeline config from {}", path.display());
    Ok(config)
}
