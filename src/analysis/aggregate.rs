use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::data::model::{Dataset, Record, SeriesId};
use crate::error::Result;

/// Period a record is grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GroupKey {
    Year,
    Quarter,
    Month,
}

/// Value of a [`GroupKey`] for one record. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodKey {
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u32),
}

impl PeriodKey {
    /// `None` for undated records, which belong to no group.
    pub fn of(record: &Record, key: GroupKey) -> Option<Self> {
        let year = record.year()?;
        Some(match key {
            GroupKey::Year => PeriodKey::Year(year),
            GroupKey::Quarter => PeriodKey::Quarter(year, record.quarter()?),
            GroupKey::Month => PeriodKey::Month(year, record.month()?),
        })
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Year(y) => write!(f, "{y}"),
            PeriodKey::Quarter(y, q) => write!(f, "{y}-Q{q}"),
            PeriodKey::Month(y, m) => write!(f, "{y}-{m:02}"),
        }
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
}

impl Reducer {
    /// Reduce the non-`NaN` values; an empty or all-missing set gives `NaN`.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = present.iter().sum();
        match self {
            Reducer::Sum => sum,
            Reducer::Mean => sum / present.len() as f64,
        }
    }
}

/// One output group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub period: PeriodKey,
    /// Number of records in the group.
    pub rows: usize,
    pub values: BTreeMap<SeriesId, f64>,
}

/// Group dated records by `key` and reduce each requested series
/// independently. Groups come back in ascending period order and together
/// cover every dated record exactly once.
pub fn aggregate(
    dataset: &Dataset,
    key: GroupKey,
    reducers: &[(SeriesId, Reducer)],
) -> Result<Vec<GroupSummary>> {
    for (id, _) in reducers {
        dataset.require(id)?;
    }

    let mut groups: BTreeMap<PeriodKey, Vec<&Record>> = BTreeMap::new();
    for record in &dataset.records {
        if let Some(period) = PeriodKey::of(record, key) {
            groups.entry(period).or_default().push(record);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(period, members)| {
            let values = reducers
                .iter()
                .map(|(id, reducer)| {
                    let column: Vec<f64> = members.iter().map(|r| r.get(id)).collect();
                    (id.clone(), reducer.reduce(&column))
                })
                .collect();
            GroupSummary {
                period,
                rows: members.len(),
                values,
            }
        })
        .collect())
}

/// Per-year sums (the yearly summary table).
pub fn yearly_summary(dataset: &Dataset, series: &[SeriesId]) -> Result<Vec<GroupSummary>> {
    let reducers: Vec<_> = series.iter().map(|id| (id.clone(), Reducer::Sum)).collect();
    aggregate(dataset, GroupKey::Year, &reducers)
}

/// Per-year means (the long-term trend series).
pub fn annual_average(dataset: &Dataset, series: &[SeriesId]) -> Result<Vec<GroupSummary>> {
    let reducers: Vec<_> = series.iter().map(|id| (id.clone(), Reducer::Mean)).collect();
    aggregate(dataset, GroupKey::Year, &reducers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::SeriesKey;
    use crate::error::PipelineError;
    use chrono::{Months, NaiveDate};
    use rstest::rstest;

    fn dataset(start: (i32, u32), m1: &[f64]) -> Dataset {
        let start = NaiveDate::from_ymd_opt(start.0, start.1, 1).unwrap();
        let records = m1
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut r = Record::new(start.checked_add_months(Months::new(i as u32)));
                r.set(SeriesKey::M1.into(), *v);
                r
            })
            .collect();
        Dataset::new(records, vec![SeriesKey::M1.into()])
    }

    #[rstest]
    #[case(Reducer::Sum, &[1.0, 2.0, 3.0], 6.0)]
    #[case(Reducer::Mean, &[1.0, 2.0, 3.0], 2.0)]
    #[case(Reducer::Sum, &[1.0, f64::NAN, 3.0], 4.0)]
    #[case(Reducer::Mean, &[1.0, f64::NAN, 3.0], 2.0)]
    fn reducers(#[case] reducer: Reducer, #[case] values: &[f64], #[case] expected: f64) {
        assert_eq!(reducer.reduce(values), expected);
    }

    #[rstest]
    #[case(Reducer::Sum)]
    #[case(Reducer::Mean)]
    fn empty_or_missing_reduces_to_nan(#[case] reducer: Reducer) {
        assert!(reducer.reduce(&[]).is_nan());
        assert!(reducer.reduce(&[f64::NAN, f64::NAN]).is_nan());
    }

    #[test]
    fn one_full_year_sums_its_rows() {
        let values: Vec<f64> = (0..12).map(|i| 100.0 + 10.0 * i as f64).collect();
        let ds = dataset((2023, 1), &values);
        let out = yearly_summary(&ds, &[SeriesKey::M1.into()]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].period, PeriodKey::Year(2023));
        assert_eq!(out[0].rows, 12);
        assert_eq!(out[0].values[&SeriesKey::M1.into()], values.iter().sum::<f64>());
    }

    #[test]
    fn groups_ascend_and_partition_dated_rows() {
        let mut ds = dataset((2022, 11), &[1.0; 15]);
        ds.records.reverse();
        ds.records.push(Record::new(None));

        let out = aggregate(&ds, GroupKey::Quarter, &[(SeriesKey::M1.into(), Reducer::Sum)]).unwrap();
        let periods: Vec<PeriodKey> = out.iter().map(|g| g.period).collect();
        let mut sorted = periods.clone();
        sorted.sort();
        assert_eq!(periods, sorted);
        assert_eq!(out.iter().map(|g| g.rows).sum::<usize>(), 15);
        assert_eq!(out.first().map(|g| g.period), Some(PeriodKey::Quarter(2022, 4)));
    }

    #[test]
    fn annual_average_means_per_year() {
        let ds = dataset((2023, 7), &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]);
        let out = annual_average(&ds, &[SeriesKey::M1.into()]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].values[&SeriesKey::M1.into()], 35.0);
        assert_eq!(out[1].values[&SeriesKey::M1.into()], 75.0);
    }

    #[test]
    fn empty_input_gives_no_groups() {
        let ds = dataset((2023, 1), &[]);
        assert!(yearly_summary(&ds, &[SeriesKey::M1.into()]).unwrap().is_empty());
    }

    #[test]
    fn unknown_series_is_rejected() {
        let ds = dataset((2023, 1), &[1.0]);
        let err = yearly_summary(&ds, &[SeriesKey::M0.into()]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSeries(_)));
    }

    #[test]
    fn period_labels() {
        assert_eq!(PeriodKey::Year(2020).to_string(), "2020");
        assert_eq!(PeriodKey::Quarter(2020, 3).to_string(), "2020-Q3");
        assert_eq!(PeriodKey::Month(2020, 3).to_string(), "2020-03");
    }
}
