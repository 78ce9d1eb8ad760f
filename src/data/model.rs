use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// SeriesKey – stable semantic identifier of a source column
// ---------------------------------------------------------------------------

/// The monetary series published in the source table.
///
/// The key is decoupled from the display header; see
/// [`crate::data::schema::HeaderMap`] for the header → key mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKey {
    M0,
    Currency,
    DemandDeposits,
    M1,
    TimeSavingsDeposits,
    M2,
    M2b,
    NfaMonetaryAuthorities,
    NfaCommercialBanks,
    Nfa,
    NcgCentralBank,
    NcgCommercialBanks,
    Ncg,
    CreditPublicCorporations,
    CreditPrivateSector,
    DomesticCredit,
    Nda,
    M2bConsolidated,
}

impl SeriesKey {
    pub const ALL: [SeriesKey; 18] = [
        SeriesKey::M0,
        SeriesKey::Currency,
        SeriesKey::DemandDeposits,
        SeriesKey::M1,
        SeriesKey::TimeSavingsDeposits,
        SeriesKey::M2,
        SeriesKey::M2b,
        SeriesKey::NfaMonetaryAuthorities,
        SeriesKey::NfaCommercialBanks,
        SeriesKey::Nfa,
        SeriesKey::NcgCentralBank,
        SeriesKey::NcgCommercialBanks,
        SeriesKey::Ncg,
        SeriesKey::CreditPublicCorporations,
        SeriesKey::CreditPrivateSector,
        SeriesKey::DomesticCredit,
        SeriesKey::Nda,
        SeriesKey::M2bConsolidated,
    ];

    /// Components of the recomputed `total` column: narrow money plus the
    /// two broad-money variants.
    pub const TOTAL_COMPONENTS: [SeriesKey; 3] = [SeriesKey::M1, SeriesKey::M2, SeriesKey::M2b];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKey::M0 => "m0",
            SeriesKey::Currency => "currency",
            SeriesKey::DemandDeposits => "demand_deposits",
            SeriesKey::M1 => "m1",
            SeriesKey::TimeSavingsDeposits => "time_savings_deposits",
            SeriesKey::M2 => "m2",
            SeriesKey::M2b => "m2b",
            SeriesKey::NfaMonetaryAuthorities => "nfa_monetary_authorities",
            SeriesKey::NfaCommercialBanks => "nfa_commercial_banks",
            SeriesKey::Nfa => "nfa",
            SeriesKey::NcgCentralBank => "ncg_central_bank",
            SeriesKey::NcgCommercialBanks => "ncg_commercial_banks",
            SeriesKey::Ncg => "ncg",
            SeriesKey::CreditPublicCorporations => "credit_public_corporations",
            SeriesKey::CreditPrivateSector => "credit_private_sector",
            SeriesKey::DomesticCredit => "domestic_credit",
            SeriesKey::Nda => "nda",
            SeriesKey::M2bConsolidated => "m2b_consolidated",
        }
    }

    /// Short human label, for legends.
    pub fn label(&self) -> &'static str {
        match self {
            SeriesKey::M0 => "Reserve Money (M0)",
            SeriesKey::Currency => "Currency held by the Public",
            SeriesKey::DemandDeposits => "Demand Deposits held by the Public",
            SeriesKey::M1 => "Narrow Money (M1)",
            SeriesKey::TimeSavingsDeposits => "Time and Savings Deposits held by the Public",
            SeriesKey::M2 => "Broad Money (M2)",
            SeriesKey::M2b => "Broad Money (M2b)",
            SeriesKey::NfaMonetaryAuthorities => "Net Foreign Assets of Monetary Authorities",
            SeriesKey::NfaCommercialBanks => "Net Foreign Assets of Commercial Banks",
            SeriesKey::Nfa => "Net Foreign Assets (NFA)",
            SeriesKey::NcgCentralBank => "Govt Credit by Central Bank",
            SeriesKey::NcgCommercialBanks => "Govt Credit by Commercial Banks",
            SeriesKey::Ncg => "Total Govt Credit (NCG)",
            SeriesKey::CreditPublicCorporations => "Credit to Public Corporations",
            SeriesKey::CreditPrivateSector => "Credit to Private Sector",
            SeriesKey::DomesticCredit => "Total Domestic Credit",
            SeriesKey::Nda => "Net Domestic Assets (NDA)",
            SeriesKey::M2bConsolidated => "Broad Money (M2b), consolidated",
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        SeriesKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PipelineError::MissingSeries(SeriesId::Derived(s.to_string())))
    }
}

// ---------------------------------------------------------------------------
// SeriesId – any column of a Dataset
// ---------------------------------------------------------------------------

/// Identifier of a numeric column: a source series, the recomputed total,
/// or a named derived series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeriesId {
    Source(SeriesKey),
    Total,
    Derived(String),
}

impl SeriesId {
    pub fn derived(name: impl Into<String>) -> Self {
        SeriesId::Derived(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            SeriesId::Source(k) => k.as_str(),
            SeriesId::Total => "total",
            SeriesId::Derived(n) => n,
        }
    }
}

impl From<SeriesKey> for SeriesId {
    fn from(key: SeriesKey) -> Self {
        SeriesId::Source(key)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SeriesId {
    type Err = std::convert::Infallible;

    /// Source keys and `total` resolve to their variants, anything else is
    /// taken as a derived series name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "total" {
            return Ok(SeriesId::Total);
        }
        Ok(match s.parse::<SeriesKey>() {
            Ok(key) => SeriesId::Source(key),
            Err(_) => SeriesId::Derived(s.to_string()),
        })
    }
}

impl Serialize for SeriesId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Record – one reporting period
// ---------------------------------------------------------------------------

/// One row of the canonical dataset (usually one month).
///
/// `year`, `quarter` and `month_name` are derived from `date` on demand so
/// they can never drift from it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    /// `None` when the source cell could not be parsed.
    pub date: Option<NaiveDate>,
    pub values: BTreeMap<SeriesId, f64>,
}

impl Record {
    pub fn new(date: Option<NaiveDate>) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }

    /// Calendar quarter, `ceil(month / 3)`.
    pub fn quarter(&self) -> Option<u8> {
        self.date.map(|d| d.month().div_ceil(3) as u8)
    }

    pub fn month(&self) -> Option<u32> {
        self.date.map(|d| d.month())
    }

    /// English month name ("January" ... "December").
    pub fn month_name(&self) -> Option<&'static str> {
        self.date
            .and_then(|d| Month::try_from(d.month() as u8).ok())
            .map(|m| m.name())
    }

    /// Value of a series, `NaN` when the record carries none.
    pub fn get(&self, id: &SeriesId) -> f64 {
        self.values.get(id).copied().unwrap_or(f64::NAN)
    }

    pub fn set(&mut self, id: SeriesId, value: f64) {
        self.values.insert(id, value);
    }
}

// NaN compares equal to NaN here so that datasets with missing cells can be
// compared for identity.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && same_value(*va, *vb))
    }
}

fn same_value(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

// ---------------------------------------------------------------------------
// Dataset – ordered sequence of records plus its column set
// ---------------------------------------------------------------------------

/// An ordered set of records and the series columns available on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub records: Vec<Record>,
    /// Columns in presentation order: source series, `total`, then derived.
    pub columns: Vec<SeriesId>,
}

impl Dataset {
    pub fn new(records: Vec<Record>, columns: Vec<SeriesId>) -> Self {
        Self { records, columns }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_series(&self, id: &SeriesId) -> bool {
        self.columns.contains(id)
    }

    /// Fail with `MissingSeries` unless `id` is a column of this dataset.
    pub fn require(&self, id: &SeriesId) -> Result<()> {
        if self.has_series(id) {
            Ok(())
        } else {
            Err(PipelineError::MissingSeries(id.clone()))
        }
    }

    /// The full column for `id`, one value per record.
    pub fn series(&self, id: &SeriesId) -> Result<Vec<f64>> {
        self.require(id)?;
        Ok(self.records.iter().map(|r| r.get(id)).collect())
    }

    /// Records that carry a parsed date.
    pub fn dated_records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.date.is_some())
    }

    /// True when dated records are in ascending date order and every
    /// undated record comes after them.
    pub fn is_sorted_by_date(&self) -> bool {
        self.records
            .windows(2)
            .all(|w| match (w[0].date, w[1].date) {
                (Some(a), Some(b)) => a <= b,
                (None, Some(_)) => false,
                _ => true,
            })
    }

    /// Stable sort by date, undated records last.
    pub fn sort_by_date(&mut self) {
        self.records.sort_by_key(|r| (r.date.is_none(), r.date));
    }

    /// Append a new column. `values` must hold one entry per record.
    pub fn push_column(&mut self, id: SeriesId, values: Vec<f64>) -> Result<()> {
        if self.has_series(&id) {
            return Err(PipelineError::DuplicateSeries(id.to_string()));
        }
        debug_assert_eq!(values.len(), self.records.len());
        for (record, value) in self.records.iter_mut().zip(values) {
            record.set(id.clone(), value);
        }
        self.columns.push(id);
        Ok(())
    }

    /// Same columns, a different selection of records.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            records,
            columns: self.columns.clone(),
        }
    }
}
