use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{Dataset, Record};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// FilterSpec – the sidebar selection
// ---------------------------------------------------------------------------

/// Conjunction of optional exact-match predicates. `None` means "All".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub year: Option<i32>,
    /// 1..=4
    pub quarter: Option<u8>,
    /// English month name, as produced by [`Record::month_name`].
    pub month_name: Option<String>,
}

impl FilterSpec {
    /// Build a spec from selector strings. `"All"` (or an empty string)
    /// leaves a field unconstrained; quarters accept `"Q3"` or `"3"`.
    pub fn from_selection(year: &str, quarter: &str, month: &str) -> Result<Self> {
        let year = match unconstrained(year) {
            None => None,
            Some(y) => Some(
                y.parse::<i32>()
                    .map_err(|_| PipelineError::InvalidFilter(format!("year '{y}'")))?,
            ),
        };
        let quarter = match unconstrained(quarter) {
            None => None,
            Some(q) => {
                let digits = q.strip_prefix(['Q', 'q']).unwrap_or(q);
                Some(
                    digits
                        .parse::<u8>()
                        .map_err(|_| PipelineError::InvalidFilter(format!("quarter '{q}'")))?,
                )
            }
        };
        let spec = FilterSpec {
            year,
            quarter,
            month_name: unconstrained(month).map(str::to_string),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// True when no field is constrained.
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.quarter.is_none() && self.month_name.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        match self.quarter {
            Some(q) if !(1..=4).contains(&q) => Err(PipelineError::InvalidFilter(format!(
                "quarter {q} is outside 1..=4"
            ))),
            _ => Ok(()),
        }
    }

    /// Whether a record passes every constrained field. Undated records
    /// never pass a constrained spec.
    pub fn matches(&self, record: &Record) -> bool {
        if self.is_empty() {
            return true;
        }
        if record.date.is_none() {
            return false;
        }
        self.year.map_or(true, |y| record.year() == Some(y))
            && self.quarter.map_or(true, |q| record.quarter() == Some(q))
            && self
                .month_name
                .as_deref()
                .map_or(true, |m| record.month_name() == Some(m))
    }
}

fn unconstrained(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(s)
    }
}

// ---------------------------------------------------------------------------
// Filter engine
// ---------------------------------------------------------------------------

/// Return a new dataset holding the records that pass `spec`, in their
/// original order. The source dataset is never modified; an empty spec
/// returns an identical copy and a spec matching nothing returns an empty
/// dataset with the same columns.
pub fn apply(dataset: &Dataset, spec: &FilterSpec) -> Result<Dataset> {
    spec.validate()?;
    let records: Vec<Record> = dataset
        .records
        .iter()
        .filter(|r| spec.matches(r))
        .cloned()
        .collect();
    log::debug!("Filter {spec:?} kept {}/{} rows", records.len(), dataset.len());
    Ok(dataset.with_records(records))
}

// ---------------------------------------------------------------------------
// Selector options
// ---------------------------------------------------------------------------

/// Values a user can pick from for each filter field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub quarters: Vec<u8>,
    /// Calendar order.
    pub months: Vec<&'static str>,
}

/// Collect the selectable values present in a dataset.
pub fn filter_options(dataset: &Dataset) -> FilterOptions {
    let years: BTreeSet<i32> = dataset.records.iter().filter_map(Record::year).collect();
    let quarters: BTreeSet<u8> = dataset.records.iter().filter_map(Record::quarter).collect();
    let months: BTreeSet<(u32, &'static str)> = dataset
        .records
        .iter()
        .filter_map(|r| Some((r.month()?, r.month_name()?)))
        .collect();

    FilterOptions {
        years: years.into_iter().collect(),
        quarters: quarters.into_iter().collect(),
        months: months.into_iter().map(|(_, name)| name).collect(),
    }
}
