use chrono::NaiveDate;
use serde::Serialize;

use super::derived::names;
use crate::data::model::{Dataset, Record, SeriesId, SeriesKey};
use crate::error::Result;

/// Largest value of a series and when it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub date: NaiveDate,
    pub value: f64,
}

/// A headline indicator. `peak` is `None` when no dated, non-`NaN` value
/// exists, or when the series itself is not part of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyIndicator {
    pub series: SeriesId,
    pub available: bool,
    pub peak: Option<Peak>,
}

/// Maximum non-`NaN` value among dated records. The first occurrence wins
/// ties.
pub fn peak(dataset: &Dataset, id: &SeriesId) -> Result<Option<Peak>> {
    dataset.require(id)?;
    Ok(dataset
        .records
        .iter()
        .filter_map(|r| {
            let value = r.get(id);
            match r.date {
                Some(date) if !value.is_nan() => Some(Peak { date, value }),
                _ => None,
            }
        })
        .fold(None, |best: Option<Peak>, p| match best {
            Some(b) if b.value >= p.value => Some(b),
            _ => Some(p),
        }))
}

/// Peak month-over-month M2 growth, maximum M1, maximum M0.
pub fn key_indicators(dataset: &Dataset) -> Vec<KeyIndicator> {
    [
        SeriesId::derived(names::M2_MOM),
        SeriesKey::M1.into(),
        SeriesKey::M0.into(),
    ]
    .into_iter()
    .map(|series| match peak(dataset, &series) {
        Ok(peak) => KeyIndicator {
            series,
            available: true,
            peak,
        },
        Err(_) => KeyIndicator {
            series,
            available: false,
            peak: None,
        },
    })
    .collect()
}

/// One slice of the money-supply composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub series: SeriesId,
    pub value: f64,
    /// Percentage of the slice total; `NaN` when the total is zero or missing.
    pub percent: f64,
}

/// Composition of M0, M1, M2 and M2b in the latest dated record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    pub date: NaiveDate,
    pub shares: Vec<Share>,
}

/// `None` when the dataset has no dated record.
pub fn latest_composition(dataset: &Dataset) -> Result<Option<Composition>> {
    let series: Vec<SeriesId> = [SeriesKey::M0, SeriesKey::M1, SeriesKey::M2, SeriesKey::M2b]
        .into_iter()
        .map(SeriesId::from)
        .collect();
    for id in &series {
        dataset.require(id)?;
    }
    let Some(latest) = dataset.dated_records().max_by_key(|r| r.date) else {
        return Ok(None);
    };
    let Some(date) = latest.date else {
        return Ok(None);
    };

    let total: f64 = series.iter().map(|id| latest.get(id)).filter(|v| !v.is_nan()).sum();
    let shares = series
        .into_iter()
        .map(|id| {
            let value = latest.get(&id);
            let percent = if total == 0.0 || value.is_nan() {
                f64::NAN
            } else {
                value * 100.0 / total
            };
            Share {
                series: id,
                value,
                percent,
            }
        })
        .collect();
    Ok(Some(Composition { date, shares }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiquidityType {
    Domestic,
    Foreign,
}

impl LiquidityType {
    /// Foreign when the monetary authorities hold positive net foreign assets.
    pub fn of(record: &Record) -> Self {
        if record.get(&SeriesKey::NfaMonetaryAuthorities.into()) > 0.0 {
            LiquidityType::Foreign
        } else {
            LiquidityType::Domestic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquiditySlice {
    pub liquidity_type: LiquidityType,
    pub rows: usize,
    pub domestic_credit: f64,
    pub foreign_assets: f64,
}

/// Domestic credit and foreign assets summed per liquidity type. Needs the
/// `domestic_credit_sum` and `foreign_assets_sum` derived series.
pub fn liquidity_breakdown(dataset: &Dataset) -> Result<Vec<LiquiditySlice>> {
    let nfa: SeriesId = SeriesKey::NfaMonetaryAuthorities.into();
    let credit = SeriesId::derived(names::DOMESTIC_CREDIT_SUM);
    let assets = SeriesId::derived(names::FOREIGN_ASSETS_SUM);
    for id in [&nfa, &credit, &assets] {
        dataset.require(id)?;
    }

    Ok([LiquidityType::Domestic, LiquidityType::Foreign]
        .into_iter()
        .map(|kind| {
            let members: Vec<&Record> = dataset
                .records
                .iter()
                .filter(|r| LiquidityType::of(r) == kind)
                .collect();
            let sum = |id: &SeriesId| -> f64 {
                members.iter().map(|r| r.get(id)).filter(|v| !v.is_nan()).sum()
            };
            LiquiditySlice {
                liquidity_type: kind,
                rows: members.len(),
                domestic_credit: sum(&credit),
                foreign_assets: sum(&assets),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, NaiveDate};

    fn ds(cols: &[(SeriesId, Vec<f64>)]) -> Dataset {
        let n = cols[0].1.len();
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let records = (0..n)
            .map(|i| {
                let mut r = Record::new(start.checked_add_months(Months::new(i as u32)));
                for (id, v) in cols {
                    r.set(id.clone(), v[i]);
                }
                r
            })
            .collect();
        Dataset::new(records, cols.iter().map(|(id, _)| id.clone()).collect())
    }

    #[test]
    fn peak_skips_nan_and_reports_date() {
        let d = ds(&[(SeriesKey::M1.into(), vec![1.0, f64::NAN, 7.0, 7.0, 3.0])]);
        let p = peak(&d, &SeriesKey::M1.into()).unwrap().unwrap();
        assert_eq!(p.value, 7.0);
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2019, 3, 1).unwrap());
    }

    #[test]
    fn peak_of_all_nan_is_none() {
        let d = ds(&[(SeriesKey::M1.into(), vec![f64::NAN, f64::NAN])]);
        assert_eq!(peak(&d, &SeriesKey::M1.into()).unwrap(), None);
    }

    #[test]
    fn indicators_mark_missing_series_unavailable() {
        let d = ds(&[
            (SeriesKey::M1.into(), vec![1.0, 2.0]),
            (SeriesKey::M0.into(), vec![5.0, 4.0]),
        ]);
        let ind = key_indicators(&d);
        assert_eq!(ind.len(), 3);
        assert!(!ind[0].available);
        assert!(ind[0].peak.is_none());
        assert_eq!(ind[1].peak.map(|p| p.value), Some(2.0));
        assert_eq!(ind[2].peak.map(|p| p.value), Some(5.0));
    }

    #[test]
    fn composition_of_latest_row() {
        let d = ds(&[
            (SeriesKey::M0.into(), vec![0.0, 10.0]),
            (SeriesKey::M1.into(), vec![0.0, 20.0]),
            (SeriesKey::M2.into(), vec![0.0, 30.0]),
            (SeriesKey::M2b.into(), vec![0.0, 40.0]),
        ]);
        let c = latest_composition(&d).unwrap().unwrap();
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2019, 2, 1).unwrap());
        let percents: Vec<f64> = c.shares.iter().map(|s| s.percent).collect();
        assert_eq!(percents, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn composition_of_empty_dataset_is_none() {
        let d = Dataset::new(
            vec![],
            [SeriesKey::M0, SeriesKey::M1, SeriesKey::M2, SeriesKey::M2b]
                .into_iter()
                .map(SeriesId::from)
                .collect(),
        );
        assert_eq!(latest_composition(&d).unwrap(), None);
    }

    #[test]
    fn liquidity_split_by_foreign_assets_sign() {
        let d = ds(&[
            (SeriesKey::NfaMonetaryAuthorities.into(), vec![-5.0, 3.0, 4.0]),
            (SeriesId::derived(names::DOMESTIC_CREDIT_SUM), vec![100.0, 200.0, f64::NAN]),
            (SeriesId::derived(names::FOREIGN_ASSETS_SUM), vec![1.0, 2.0, 3.0]),
        ]);
        let slices = liquidity_breakdown(&d).unwrap();
        assert_eq!(slices[0].liquidity_type, LiquidityType::Domestic);
        assert_eq!(slices[0].rows, 1);
        assert_eq!(slices[0].domestic_credit, 100.0);
        assert_eq!(slices[1].rows, 2);
        assert_eq!(slices[1].domestic_credit, 200.0);
        assert_eq!(slices[1].foreign_assets, 5.0);
    }
}
