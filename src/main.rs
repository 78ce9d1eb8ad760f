use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use monetary_trends::app::{MonetaryDashboard, RelationshipSelection};
use monetary_trends::config::load_config;
use monetary_trends::data::loader::export_csv;
use monetary_trends::state::AppState;
use monetary_trends::{FilterSpec, PipelineConfig, SeriesId};

/// Monetary statistics dashboard: loads a published money-supply table and
/// prints every dashboard view as JSON.
#[derive(Parser, Debug)]
#[command(name = "monetary-trends", version, about)]
struct Cli {
    /// CSV or Parquet file with the monetary statistics
    input: PathBuf,

    /// JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Year filter ("All" or e.g. 2023)
    #[arg(long, default_value = "All")]
    year: String,

    /// Quarter filter ("All", 2 or Q2)
    #[arg(long, default_value = "All")]
    quarter: String,

    /// Month filter ("All" or a full month name)
    #[arg(long, default_value = "All")]
    month: String,

    /// Relationship explorer x series
    #[arg(long, default_value = "m0")]
    x: String,

    /// Relationship explorer y series
    #[arg(long, default_value = "m2")]
    y: String,

    /// Write the filtered rows to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let mut state = AppState::new(&cli.input, config);
    state
        .launch_dashboard()
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;

    let filter = FilterSpec::from_selection(&cli.year, &cli.quarter, &cli.month)
        .context("Invalid filter selection")?;
    state.set_filter(filter)?;
    log::info!("{} rows match the current filter", state.view.len());

    if let Some(path) = &cli.export {
        export_csv(&state.view, path, state.cache.config())
            .with_context(|| format!("Failed to export {}", path.display()))?;
        log::info!("Exported filtered rows to {}", path.display());
    }

    let selection = RelationshipSelection {
        x: cli.x.parse::<SeriesId>()?,
        y: cli.y.parse::<SeriesId>()?,
    };
    let snapshot = MonetaryDashboard::new(selection).snapshot(&state)?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    println!("{json}");
    Ok(())
}
