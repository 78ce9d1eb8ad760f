use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::aggregate::{annual_average, yearly_summary, GroupSummary};
use crate::analysis::derived::names;
use crate::analysis::highlights::{
    key_indicators, latest_composition, liquidity_breakdown, Composition, KeyIndicator,
    LiquiditySlice,
};
use crate::analysis::relationship::{analyze, correlation_matrix, CorrelationMatrix, Relationship};
use crate::data::filter::{filter_options, FilterOptions, FilterSpec};
use crate::data::model::{Dataset, SeriesId, SeriesKey};
use crate::error::{PipelineError, Result};
use crate::state::AppState;

/// Series the source file does not publish. Consumers get an explicit
/// marker for them; no values are ever synthesised.
pub const UNPUBLISHED_SERIES: [&str; 2] = ["interest_rate", "inflation"];

const MONEY_SUPPLY: [SeriesKey; 4] = [SeriesKey::M0, SeriesKey::M1, SeriesKey::M2, SeriesKey::M2b];

const CREDIT: [SeriesKey; 6] = [
    SeriesKey::NcgCentralBank,
    SeriesKey::NcgCommercialBanks,
    SeriesKey::Ncg,
    SeriesKey::CreditPublicCorporations,
    SeriesKey::CreditPrivateSector,
    SeriesKey::DomesticCredit,
];

// ---------------------------------------------------------------------------
// Output shapes for the rendering layer
// ---------------------------------------------------------------------------

/// Dated columns ready for charting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesBundle {
    pub dates: Vec<Option<NaiveDate>>,
    pub series: BTreeMap<SeriesId, Vec<f64>>,
}

impl SeriesBundle {
    /// Collect the requested columns that exist; the others are reported
    /// through `unavailable`.
    fn collect(dataset: &Dataset, ids: &[SeriesId], unavailable: &mut Vec<String>) -> Self {
        let mut series = BTreeMap::new();
        for id in ids {
            match dataset.series(id) {
                Ok(values) => {
                    series.insert(id.clone(), values);
                }
                Err(_) => note_unavailable(unavailable, id.name()),
            }
        }
        Self {
            dates: dataset.records.iter().map(|r| r.date).collect(),
            series,
        }
    }
}

/// Everything the dashboard tabs render for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub filter: FilterSpec,
    pub options: FilterOptions,
    /// Filtered rows, for raw display and download.
    pub rows: Dataset,
    pub money_supply: SeriesBundle,
    pub credit: SeriesBundle,
    pub liquidity_ratios: SeriesBundle,
    pub growth: SeriesBundle,
    pub yearly_summary: Vec<GroupSummary>,
    pub annual_average: Vec<GroupSummary>,
    pub credit_vs_money: Option<CorrelationMatrix>,
    pub relationship: Option<Relationship>,
    pub indicators: Vec<KeyIndicator>,
    pub composition: Option<Composition>,
    pub liquidity: Option<Vec<LiquiditySlice>>,
    /// Series or views that could not be produced from this dataset.
    pub unavailable: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Relationship explorer axes.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipSelection {
    pub x: SeriesId,
    pub y: SeriesId,
}

impl Default for RelationshipSelection {
    fn default() -> Self {
        Self {
            x: SeriesKey::M0.into(),
            y: SeriesKey::M2.into(),
        }
    }
}

/// Assembles the views of every dashboard tab from the session state.
#[derive(Debug, Default)]
pub struct MonetaryDashboard {
    pub selection: RelationshipSelection,
}

impl MonetaryDashboard {
    pub fn new(selection: RelationshipSelection) -> Self {
        Self { selection }
    }

    /// Build the snapshot for the current filter. A missing series only
    /// blanks the views that need it.
    pub fn snapshot(&self, state: &AppState) -> Result<DashboardSnapshot> {
        let Some(dataset) = state.dataset.as_deref() else {
            return Err(PipelineError::NotLoaded);
        };
        let view = &state.view;
        let mut unavailable: Vec<String> = state.skipped_series.clone();
        unavailable.extend(UNPUBLISHED_SERIES.iter().map(|s| s.to_string()));

        let money: Vec<SeriesId> = MONEY_SUPPLY.iter().map(|k| SeriesId::from(*k)).collect();
        let credit: Vec<SeriesId> = CREDIT.iter().map(|k| SeriesId::from(*k)).collect();
        let ratios: Vec<SeriesId> = [
            names::CURRENCY_RATIO,
            names::RESERVE_MONEY_RATIO,
            names::MONEY_MULTIPLIER,
            names::DEPOSIT_RATIO,
        ]
        .into_iter()
        .map(SeriesId::derived)
        .collect();
        let growth: Vec<SeriesId> = [names::M1_YOY, names::M2_YOY, names::M2B_YOY, names::M2_MOM]
            .into_iter()
            .map(SeriesId::derived)
            .collect();

        let present_money: Vec<SeriesId> =
            money.iter().filter(|id| view.has_series(id)).cloned().collect();
        let trend: Vec<SeriesId> = present_money
            .iter()
            .filter(|id| **id != SeriesId::Source(SeriesKey::M0))
            .cloned()
            .collect();

        let mut matrix_series = credit.clone();
        matrix_series.extend(trend.iter().cloned());
        matrix_series.retain(|id| view.has_series(id));

        let relationship = soft(
            analyze(view, &self.selection.x, &self.selection.y),
            &mut unavailable,
            "relationship",
        );
        if let Some(rel) = &relationship {
            if rel.trend.is_none() {
                log::debug!("Trend line omitted: {} usable points", rel.n_points);
            }
        }

        Ok(DashboardSnapshot {
            filter: state.filters.clone(),
            options: filter_options(dataset),
            rows: view.clone(),
            money_supply: SeriesBundle::collect(view, &money, &mut unavailable),
            credit: SeriesBundle::collect(view, &credit, &mut unavailable),
            liquidity_ratios: SeriesBundle::collect(view, &ratios, &mut unavailable),
            growth: SeriesBundle::collect(view, &growth, &mut unavailable),
            yearly_summary: yearly_summary(view, &present_money)?,
            annual_average: annual_average(view, &trend)?,
            credit_vs_money: soft(
                correlation_matrix(view, &matrix_series),
                &mut unavailable,
                "credit_vs_money",
            ),
            relationship,
            indicators: key_indicators(view),
            composition: soft(latest_composition(view), &mut unavailable, "composition").flatten(),
            liquidity: soft(liquidity_breakdown(view), &mut unavailable, "liquidity"),
            unavailable,
        })
    }
}

/// Turn a `MissingSeries` failure into `None`, remembering which view was
/// dropped.
fn soft<T>(result: Result<T>, unavailable: &mut Vec<String>, view: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("View '{view}' unavailable: {e}");
            note_unavailable(unavailable, view);
            None
        }
    }
}

fn note_unavailable(unavailable: &mut Vec<String>, name: &str) {
    if !unavailable.iter().any(|n| n == name) {
        unavailable.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::path::{Path, PathBuf};

    fn write_two_years(dir: &Path) -> PathBuf {
        let path = dir.join("stats.csv");
        let mut text = String::from("Date,m0,currency,demand_deposits,m1,m2,m2b,nfa_monetary_authorities\n");
        for i in 0..24 {
            let (y, m) = (2023 + i / 12, i % 12 + 1);
            let m1 = 100 + 10 * i;
            let nfa = if i % 2 == 0 { 5 } else { -5 };
            text.push_str(&format!(
                "{y}-{m:02}-01,{},{},{},{m1},{},{},{nfa}\n",
                50 + i,
                m1 / 2,
                m1 / 2,
                3 * m1,
                4 * m1
            ));
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    fn launched(dir: &Path) -> AppState {
        let mut state = AppState::new(write_two_years(dir), PipelineConfig::default());
        state.launch_dashboard().unwrap();
        state
    }

    #[test]
    fn snapshot_covers_every_tab() {
        let dir = tempfile::tempdir().unwrap();
        let state = launched(dir.path());
        let snap = MonetaryDashboard::default().snapshot(&state).unwrap();

        assert_eq!(snap.rows.len(), 24);
        assert_eq!(snap.money_supply.series.len(), 4);
        assert_eq!(snap.yearly_summary.len(), 2);
        assert_eq!(snap.annual_average.len(), 2);
        assert!(snap.growth.series.contains_key(&SeriesId::derived(names::M2_YOY)));
        assert!(snap.liquidity_ratios.series.contains_key(&SeriesId::derived(names::CURRENCY_RATIO)));

        let rel = snap.relationship.unwrap();
        assert_eq!(rel.n_points, 24);
        assert!(rel.trend.is_some());

        assert!(snap.composition.is_some());
        // credit series are absent from this file
        assert!(snap.unavailable.contains(&"ncg".to_string()));
        assert!(snap.unavailable.contains(&"liquidity".to_string()));
        assert!(snap.liquidity.is_none());
        for marker in UNPUBLISHED_SERIES {
            assert!(snap.unavailable.contains(&marker.to_string()));
        }
    }

    #[test]
    fn empty_selection_renders_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = launched(dir.path());
        state
            .set_filter(FilterSpec {
                year: Some(1990),
                ..Default::default()
            })
            .unwrap();
        let snap = MonetaryDashboard::default().snapshot(&state).unwrap();

        assert!(snap.rows.is_empty());
        assert!(snap.yearly_summary.is_empty());
        assert!(snap.composition.is_none());
        let rel = snap.relationship.unwrap();
        assert_eq!(rel.n_points, 0);
        assert!(rel.correlation.is_nan());
        // options still describe the whole dataset
        assert_eq!(snap.options.years, vec![2023, 2024]);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = launched(dir.path());
        let snap = MonetaryDashboard::default().snapshot(&state).unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["yearly_summary"][0]["period"], "2023");
        assert!(json["money_supply"]["series"]["m1"].is_array());
    }

    #[test]
    fn snapshot_requires_loaded_dataset() {
        let state = AppState::new("nowhere.csv", PipelineConfig::default());
        let err = MonetaryDashboard::default().snapshot(&state).unwrap_err();
        assert!(matches!(err, PipelineError::NotLoaded));
    }
}
