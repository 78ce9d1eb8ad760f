use crate::data::model::{Dataset, SeriesId, SeriesKey};
use crate::error::{PipelineError, Result};

/// Names of the derived series the dashboard computes by default.
pub mod names {
    pub const M1_YOY: &str = "m1_yoy";
    pub const M2_YOY: &str = "m2_yoy";
    pub const M2B_YOY: &str = "m2b_yoy";
    pub const M2_MOM: &str = "m2_mom";
    pub const CURRENCY_RATIO: &str = "currency_ratio";
    pub const RESERVE_MONEY_RATIO: &str = "reserve_money_ratio";
    pub const MONEY_MULTIPLIER: &str = "money_multiplier";
    pub const DEPOSIT_RATIO: &str = "deposit_ratio";
    pub const DOMESTIC_CREDIT_SUM: &str = "domestic_credit_sum";
    pub const FOREIGN_ASSETS_SUM: &str = "foreign_assets_sum";
}

// ---------------------------------------------------------------------------
// DerivedSeriesSpec
// ---------------------------------------------------------------------------

/// A named function over existing series producing a new series.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedSeriesSpec {
    /// `(v[i] - v[i-lag]) / v[i-lag] * 100`
    GrowthRate {
        name: String,
        source: SeriesId,
        lag: usize,
    },
    /// `numerator[i] / denominator[i]`
    Ratio {
        name: String,
        numerator: SeriesId,
        denominator: SeriesId,
    },
    /// Exact sum of the components, `NaN` if any is `NaN`.
    Composite {
        name: String,
        components: Vec<SeriesId>,
    },
}

impl DerivedSeriesSpec {
    pub fn growth(name: &str, source: impl Into<SeriesId>, lag: usize) -> Self {
        DerivedSeriesSpec::GrowthRate {
            name: name.to_string(),
            source: source.into(),
            lag,
        }
    }

    pub fn ratio(name: &str, numerator: impl Into<SeriesId>, denominator: impl Into<SeriesId>) -> Self {
        DerivedSeriesSpec::Ratio {
            name: name.to_string(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }

    pub fn composite<I, S>(name: &str, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SeriesId>,
    {
        DerivedSeriesSpec::Composite {
            name: name.to_string(),
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DerivedSeriesSpec::GrowthRate { name, .. }
            | DerivedSeriesSpec::Ratio { name, .. }
            | DerivedSeriesSpec::Composite { name, .. } => name,
        }
    }

    pub fn output_id(&self) -> SeriesId {
        SeriesId::Derived(self.name().to_string())
    }

    /// Evaluate against a dataset already sorted by date.
    fn evaluate(&self, dataset: &Dataset) -> Result<Vec<f64>> {
        match self {
            DerivedSeriesSpec::GrowthRate { source, lag, .. } => {
                let values = dataset.series(source)?;
                // Undated rows sit at the end after sorting and have no
                // position in the monthly sequence.
                let dated = dataset.dated_records().count();
                let mut out = growth_rate(&values[..dated], *lag);
                out.resize(values.len(), f64::NAN);
                Ok(out)
            }
            DerivedSeriesSpec::Ratio {
                numerator,
                denominator,
                ..
            } => Ok(ratio(&dataset.series(numerator)?, &dataset.series(denominator)?)),
            DerivedSeriesSpec::Composite { components, .. } => composite(dataset, components),
        }
    }
}

// ---------------------------------------------------------------------------
// Column kernels
// ---------------------------------------------------------------------------

/// Percentage change against the value `lag` positions earlier.
///
/// `NaN` for the first `lag` positions and wherever the base is zero or `NaN`.
pub fn growth_rate(values: &[f64], lag: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i < lag {
                return f64::NAN;
            }
            let base = values[i - lag];
            if base.is_nan() || base == 0.0 {
                f64::NAN
            } else {
                (v - base) / base * 100.0
            }
        })
        .collect()
}

/// Element-wise ratio; `NaN` on a zero denominator.
pub fn ratio(numerator: &[f64], denominator: &[f64]) -> Vec<f64> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(&n, &d)| if d == 0.0 { f64::NAN } else { n / d })
        .collect()
}

/// Row-wise sum of the named components. A missing component value is never
/// replaced by zero, so `NaN` propagates.
pub fn composite(dataset: &Dataset, components: &[SeriesId]) -> Result<Vec<f64>> {
    for id in components {
        dataset.require(id)?;
    }
    Ok(dataset
        .records
        .iter()
        .map(|r| {
            if components.is_empty() {
                f64::NAN
            } else {
                components.iter().map(|id| r.get(id)).sum()
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Append every spec's output to a copy of `dataset`, in order. Later specs
/// may reference earlier outputs.
///
/// Input that is not in date order is sorted (stable, undated rows last)
/// before anything is computed.
pub fn compute(dataset: &Dataset, specs: &[DerivedSeriesSpec]) -> Result<Dataset> {
    let mut out = sorted_copy(dataset);
    for spec in specs {
        apply_spec(&mut out, spec)?;
    }
    Ok(out)
}

/// Like [`compute`] but a spec whose inputs are unavailable is skipped
/// instead of failing the whole batch. Skipped specs are returned with
/// their error.
pub fn compute_available(
    dataset: &Dataset,
    specs: &[DerivedSeriesSpec],
) -> (Dataset, Vec<(String, PipelineError)>) {
    let mut out = sorted_copy(dataset);
    let mut skipped = Vec::new();
    for spec in specs {
        if let Err(e) = apply_spec(&mut out, spec) {
            log::warn!("Derived series '{}' skipped: {e}", spec.name());
            skipped.push((spec.name().to_string(), e));
        }
    }
    (out, skipped)
}

fn sorted_copy(dataset: &Dataset) -> Dataset {
    let mut out = dataset.clone();
    if !out.is_sorted_by_date() {
        log::debug!("Sorting {} rows by date before deriving series", out.len());
        out.sort_by_date();
    }
    out
}

fn apply_spec(dataset: &mut Dataset, spec: &DerivedSeriesSpec) -> Result<()> {
    let id = spec.output_id();
    // A derived name must not shadow a source key or `total`.
    if !matches!(spec.name().parse::<SeriesId>(), Ok(SeriesId::Derived(_))) {
        return Err(PipelineError::DuplicateSeries(spec.name().to_string()));
    }
    let values = spec.evaluate(dataset)?;
    dataset.push_column(id, values)
}

/// The derived series shown by the dashboard tabs.
pub fn standard_specs(growth_lag: usize) -> Vec<DerivedSeriesSpec> {
    use names::*;
    vec![
        DerivedSeriesSpec::growth(M1_YOY, SeriesKey::M1, growth_lag),
        DerivedSeriesSpec::growth(M2_YOY, SeriesKey::M2, growth_lag),
        DerivedSeriesSpec::growth(M2B_YOY, SeriesKey::M2b, growth_lag),
        DerivedSeriesSpec::growth(M2_MOM, SeriesKey::M2, 1),
        DerivedSeriesSpec::ratio(CURRENCY_RATIO, SeriesKey::Currency, SeriesKey::M1),
        DerivedSeriesSpec::ratio(RESERVE_MONEY_RATIO, SeriesKey::M0, SeriesKey::M2),
        DerivedSeriesSpec::ratio(MONEY_MULTIPLIER, SeriesKey::M2, SeriesKey::M0),
        DerivedSeriesSpec::ratio(DEPOSIT_RATIO, SeriesKey::DemandDeposits, SeriesKey::M1),
        DerivedSeriesSpec::composite(
            DOMESTIC_CREDIT_SUM,
            [
                SeriesKey::NcgCentralBank,
                SeriesKey::NcgCommercialBanks,
                SeriesKey::CreditPublicCorporations,
                SeriesKey::CreditPrivateSector,
            ],
        ),
        DerivedSeriesSpec::composite(
            FOREIGN_ASSETS_SUM,
            [SeriesKey::NfaMonetaryAuthorities, SeriesKey::NfaCommercialBanks],
        ),
    ]
}
