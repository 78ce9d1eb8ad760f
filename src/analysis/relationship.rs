use std::fmt;

use serde::Serialize;

use crate::data::model::{Dataset, SeriesId};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Ordinary-least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    /// Line endpoints at the smallest and largest masked `x`.
    pub endpoints: [[f64; 2]; 2],
}

impl TrendLine {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Qualitative band of a correlation coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    StrongPositive,
    ModeratePositive,
    WeakOrNone,
    ModerateNegative,
    StrongNegative,
    NotAvailable,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        if r.is_nan() {
            CorrelationStrength::NotAvailable
        } else if r > 0.7 {
            CorrelationStrength::StrongPositive
        } else if r > 0.3 {
            CorrelationStrength::ModeratePositive
        } else if r >= -0.3 {
            CorrelationStrength::WeakOrNone
        } else if r >= -0.7 {
            CorrelationStrength::ModerateNegative
        } else {
            CorrelationStrength::StrongNegative
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CorrelationStrength::StrongPositive => "strong positive",
            CorrelationStrength::ModeratePositive => "moderate positive",
            CorrelationStrength::WeakOrNone => "weak or no",
            CorrelationStrength::ModerateNegative => "moderate negative",
            CorrelationStrength::StrongNegative => "strong negative",
            CorrelationStrength::NotAvailable => "not available",
        }
    }
}

impl fmt::Display for CorrelationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of the relationship explorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub x: SeriesId,
    pub y: SeriesId,
    /// Pearson coefficient, `NaN` when not available.
    pub correlation: f64,
    pub strength: CorrelationStrength,
    /// Omitted when fewer than two masked points exist or `x` is constant.
    pub trend: Option<TrendLine>,
    /// Pairs left after masking.
    pub n_points: usize,
}

impl Relationship {
    pub fn slope(&self) -> Option<f64> {
        self.trend.map(|t| t.slope)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.trend.map(|t| t.intercept)
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// Drop every pair where either side is `NaN`.
pub fn mask_pairs(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect()
}

struct Moments {
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    /// Raw sums of squares, the scale against which `sxx`/`syy` are judged.
    sum_xx: f64,
    sum_yy: f64,
}

impl Moments {
    /// A constant series whose value is not exactly representable (0.1)
    /// leaves rounding residue in the centred sum; treat that as zero.
    fn x_is_constant(&self) -> bool {
        self.sxx <= f64::EPSILON * self.sum_xx
    }

    fn y_is_constant(&self) -> bool {
        self.syy <= f64::EPSILON * self.sum_yy
    }
}

fn moments(pairs: &[(f64, f64)]) -> Moments {
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    let (mut sum_xx, mut sum_yy) = (0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
        sum_xx += x * x;
        sum_yy += y * y;
    }
    Moments {
        mean_x,
        mean_y,
        sxx,
        syy,
        sxy,
        sum_xx,
        sum_yy,
    }
}

/// Pearson correlation over already-masked pairs. `NaN` for fewer than two
/// pairs or zero variance on either side.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let m = moments(pairs);
    if m.x_is_constant() || m.y_is_constant() {
        return f64::NAN;
    }
    (m.sxy / (m.sxx.sqrt() * m.syy.sqrt())).clamp(-1.0, 1.0)
}

/// Closed-form least-squares fit over already-masked pairs.
pub fn linear_fit(pairs: &[(f64, f64)]) -> Option<TrendLine> {
    if pairs.len() < 2 {
        return None;
    }
    let m = moments(pairs);
    if m.x_is_constant() {
        return None;
    }
    let slope = m.sxy / m.sxx;
    let intercept = m.mean_y - slope * m.mean_x;

    let min_x = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    Some(TrendLine {
        slope,
        intercept,
        endpoints: [
            [min_x, slope * min_x + intercept],
            [max_x, slope * max_x + intercept],
        ],
    })
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Correlate two series of a dataset and fit a trend line through them.
///
/// Only a missing series is an error; too few points gives a result with a
/// `NaN` correlation and no trend line.
pub fn analyze(dataset: &Dataset, x: &SeriesId, y: &SeriesId) -> Result<Relationship> {
    let xs = dataset.series(x)?;
    let ys = dataset.series(y)?;
    let pairs = mask_pairs(&xs, &ys);

    let correlation = pearson(&pairs);
    Ok(Relationship {
        x: x.clone(),
        y: y.clone(),
        correlation,
        strength: CorrelationStrength::from_coefficient(correlation),
        trend: linear_fit(&pairs),
        n_points: pairs.len(),
    })
}

/// Pairwise correlations between several series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub series: Vec<SeriesId>,
    /// `values[i][j]` = corr(series[i], series[j]).
    pub values: Vec<Vec<f64>>,
}

/// Correlation matrix with pairwise masking: each cell uses every row where
/// both of its series are present.
pub fn correlation_matrix(dataset: &Dataset, series: &[SeriesId]) -> Result<CorrelationMatrix> {
    let columns = series
        .iter()
        .map(|id| dataset.series(id))
        .collect::<Result<Vec<_>>>()?;

    let n = columns.len();
    let mut values = vec![vec![f64::NAN; n]; n];
    for i in 0..n {
        for j in i..n {
            let r = pearson(&mask_pairs(&columns[i], &columns[j]));
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    Ok(CorrelationMatrix {
        series: series.to_vec(),
        values,
    })
}
