//! Monthly monetary statistics pipeline: ingestion, derived series,
//! filtering, period aggregation and relationship analysis for a dashboard
//! front end.

pub mod analysis;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use config::PipelineConfig;
pub use data::filter::FilterSpec;
pub use data::model::{Dataset, Record, SeriesId, SeriesKey};
pub use error::{PipelineError, Result};
