use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};

use super::model::{Dataset, Record, SeriesId, SeriesKey};
use crate::analysis::derived::composite;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Raw input – what the file readers hand to the normalizer
// ---------------------------------------------------------------------------

/// A single untyped cell as read from the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Empty,
}

/// Header row plus data rows, before any interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

// ---------------------------------------------------------------------------
// Header → semantic key mapping table
// ---------------------------------------------------------------------------

/// Headers of the published monthly monetary survey. Line breaks and padding
/// are part of the original text; matching ignores all whitespace.
const SOURCE_HEADERS: [(SeriesKey, &str); 18] = [
    (SeriesKey::M0, "Reserve Money (M0)  (a)"),
    (SeriesKey::Currency, "Currency held by the Public"),
    (SeriesKey::DemandDeposits, "Demand Deposits held by the Public"),
    (SeriesKey::M1, "Narrow Money (M1) \n(c)    \n (1) + (2)"),
    (SeriesKey::TimeSavingsDeposits, "Time and Savings Deposits held by the Public"),
    (SeriesKey::M2, "Broad Money (M2) (b)"),
    (SeriesKey::M2b, "Broad Money (M2b) \n(d)            \n (3) + (4)"),
    (SeriesKey::NfaMonetaryAuthorities, "Net Foreign Assets of Monetary Authorities (e)"),
    (SeriesKey::NfaCommercialBanks, "Net Foreign Assets of Commercial Banks "),
    (SeriesKey::Nfa, "Net Foreign Assets (NFA) \n(5) + (6)"),
    (SeriesKey::NcgCentralBank, "Net Credit granted to the Government by Central Bank"),
    (SeriesKey::NcgCommercialBanks, "Net Credit granted to the Government by Commercial Banks"),
    (SeriesKey::Ncg, "Net Credit granted to the Government (NCG)\n(8) + (9)"),
    (SeriesKey::CreditPublicCorporations, "Credit granted to Public Corporations by Commercial Banks"),
    (SeriesKey::CreditPrivateSector, "Credit granted to the Private Sector by Commercial Banks"),
    (SeriesKey::DomesticCredit, "Domestic Credit \n(10) + (11) + (12)"),
    (SeriesKey::Nda, "Net Domestic Assets  (NDA)       \n (13) + (14)"),
    (SeriesKey::M2bConsolidated, "Broad Money (M2b)\n (7) + (15)"),
];

/// Display header the source file uses for `key`.
pub fn source_header(key: SeriesKey) -> &'static str {
    SOURCE_HEADERS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, h)| *h)
        .unwrap_or_else(|| key.as_str())
}

/// Lowercase with every whitespace character removed.
fn compact(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip trailing footnote markers such as `(a)` or `(3)+(4)` from a
/// compacted header.
fn stem(compacted: &str) -> String {
    let mut s = compacted;
    loop {
        s = s.trim_end_matches('+');
        let Some(body) = s.strip_suffix(')') else { break };
        let Some(open) = body.rfind('(') else { break };
        let inner = &body[open + 1..];
        let is_marker = (!inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()))
            || (inner.len() == 1 && inner.chars().all(|c| c.is_ascii_alphabetic()));
        if !is_marker {
            break;
        }
        s = &body[..open];
    }
    s.to_string()
}

/// Explicit header-to-semantic-key table, built once per load.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    exact: HashMap<String, SeriesKey>,
    /// Footnote-free stems; only stems that identify a single key survive.
    stems: HashMap<String, SeriesKey>,
    date_headers: Vec<String>,
}

impl HeaderMap {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut exact = HashMap::new();
        for (key, header) in SOURCE_HEADERS {
            exact.insert(compact(header), key);
        }
        for key in SeriesKey::ALL {
            exact.entry(compact(key.as_str())).or_insert(key);
            exact.entry(compact(key.label())).or_insert(key);
        }
        for (name, aliases) in &config.header_aliases {
            match name.parse::<SeriesKey>() {
                Ok(key) => {
                    for alias in aliases {
                        exact.insert(compact(alias), key);
                    }
                }
                Err(_) => log::warn!("Ignoring header aliases for unknown series '{name}'"),
            }
        }

        let mut stem_candidates: HashMap<String, Option<SeriesKey>> = HashMap::new();
        for (text, key) in &exact {
            let entry = stem_candidates.entry(stem(text)).or_insert(Some(*key));
            if *entry != Some(*key) {
                *entry = None;
            }
        }
        let stems = stem_candidates
            .into_iter()
            .filter_map(|(s, key)| key.map(|k| (s, k)))
            .collect();

        let mut date_headers: Vec<String> = config.date_headers.iter().map(|h| compact(h)).collect();
        date_headers.push("date".to_string());

        Self {
            exact,
            stems,
            date_headers,
        }
    }

    pub fn is_date_header(&self, header: &str) -> bool {
        self.date_headers.contains(&compact(header))
    }

    /// Resolve one header to its semantic key.
    pub fn lookup(&self, header: &str) -> Option<SeriesKey> {
        let c = compact(header);
        self.exact
            .get(&c)
            .or_else(|| self.stems.get(&stem(&c)))
            .copied()
    }

    /// Resolve a whole header row, validating it as a set.
    pub fn resolve(&self, headers: &[String], required: &[SeriesKey]) -> Result<ColumnMapping> {
        let mut date_idx = None;
        let mut series: BTreeMap<SeriesKey, usize> = BTreeMap::new();

        for (idx, header) in headers.iter().enumerate() {
            if date_idx.is_none() && self.is_date_header(header) {
                date_idx = Some(idx);
                continue;
            }
            match self.lookup(header) {
                Some(key) => {
                    if let Some(&prev) = series.get(&key) {
                        return Err(PipelineError::AmbiguousHeader {
                            key,
                            first: headers[prev].clone(),
                            second: header.clone(),
                        });
                    }
                    series.insert(key, idx);
                }
                None => log::debug!("Unmapped column {header:?} ignored"),
            }
        }

        let date_idx = date_idx.ok_or(PipelineError::MissingDateColumn)?;
        let missing: Vec<SeriesKey> = required
            .iter()
            .copied()
            .filter(|k| !series.contains_key(k))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingRequiredSeries(missing));
        }

        Ok(ColumnMapping {
            date_idx,
            series: series.into_iter().collect(),
        })
    }
}

/// Column positions of the date and of every mapped series.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub date_idx: usize,
    /// Ordered by semantic key.
    pub series: Vec<(SeriesKey, usize)>,
}

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

/// Parse a date cell, trying each format in turn. Time of day is dropped.
/// Month-only formats (`%b-%Y`, `%Y-%m`) resolve to the first of the month.
pub fn parse_date(cell: &RawCell, formats: &[String]) -> Option<NaiveDate> {
    let text = match cell {
        RawCell::Date(d) => return Some(*d),
        RawCell::Text(s) => s.trim(),
        RawCell::Number(_) | RawCell::Empty => return None,
    };
    if text.is_empty() {
        return None;
    }

    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    for fmt in formats {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("01 {text}"), &format!("%d {fmt}")) {
            return Some(d);
        }
    }
    None
}

/// Coerce a numeric cell; anything unparseable becomes `NaN`.
pub fn parse_number(cell: &RawCell) -> f64 {
    match cell {
        RawCell::Number(n) => *n,
        RawCell::Text(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<f64>().unwrap_or(f64::NAN)
        }
        RawCell::Date(_) | RawCell::Empty => f64::NAN,
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Turn a raw table into the canonical dataset: typed dates, `NaN` for
/// missing numbers, a recomputed `total`, ascending date order.
pub fn normalize(raw: &RawTable, config: &PipelineConfig) -> Result<Dataset> {
    let header_map = HeaderMap::new(config);
    let mapping = header_map.resolve(&raw.headers, &config.required_series)?;

    let mut unparsed_dates = 0usize;
    let records: Vec<Record> = raw
        .rows
        .iter()
        .map(|row| {
            let date = row
                .get(mapping.date_idx)
                .and_then(|cell| parse_date(cell, &config.date_formats));
            if date.is_none() {
                unparsed_dates += 1;
            }
            let mut record = Record::new(date);
            for (key, idx) in &mapping.series {
                let value = row.get(*idx).map(parse_number).unwrap_or(f64::NAN);
                record.set(SeriesId::Source(*key), value);
            }
            record
        })
        .collect();

    if unparsed_dates > 0 {
        log::warn!("{unparsed_dates} row(s) have no parseable date and are excluded from grouped views");
    }

    let columns = mapping.series.iter().map(|(k, _)| SeriesId::Source(*k)).collect();
    let mut dataset = Dataset::new(records, columns);
    dataset.sort_by_date();

    let components: Vec<SeriesId> = SeriesKey::TOTAL_COMPONENTS
        .iter()
        .map(|k| SeriesId::Source(*k))
        .collect();
    match composite(&dataset, &components) {
        Ok(total) => dataset.push_column(SeriesId::Total, total)?,
        Err(e) => log::warn!("Total not computed: {e}"),
    }

    log::info!(
        "Normalized {} rows with {} series",
        dataset.len(),
        dataset.columns.len()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    #[rstest]
    #[case("Reserve Money (M0)  (a)", Some(SeriesKey::M0))]
    #[case("Reserve Money (M0) (a)", Some(SeriesKey::M0))]
    #[case("Narrow Money (M1) \n(c)    \n (1) + (2)", Some(SeriesKey::M1))]
    #[case("Narrow Money (M1)\n(c)\n(1)+(2)", Some(SeriesKey::M1))]
    #[case("Narrow Money (M1)", Some(SeriesKey::M1))]
    #[case("Broad Money (M2b) \n(d)            \n (3) + (4)", Some(SeriesKey::M2b))]
    #[case("Broad Money (M2b)\n (7) + (15)", Some(SeriesKey::M2bConsolidated))]
    #[case("Net Foreign Assets of Commercial Banks", Some(SeriesKey::NfaCommercialBanks))]
    #[case("Net Domestic Assets (NDA) (13) + (14)", Some(SeriesKey::Nda))]
    #[case("m2", Some(SeriesKey::M2))]
    #[case("Total", None)]
    #[case("Interest Rate", None)]
    fn header_resolution(#[case] header: &str, #[case] expected: Option<SeriesKey>) {
        let map = HeaderMap::new(&PipelineConfig::default());
        assert_eq!(map.lookup(header), expected);
    }

    #[test]
    fn configured_alias_is_honoured() {
        let mut cfg = PipelineConfig::default();
        cfg.header_aliases
            .insert("credit_private_sector".into(), vec!["Private credit".into()]);
        let map = HeaderMap::new(&cfg);
        assert_eq!(map.lookup("PRIVATE   credit"), Some(SeriesKey::CreditPrivateSector));
    }

    #[test]
    fn stem_strips_footnotes_only() {
        assert_eq!(stem("broadmoney(m2b)(d)(3)+(4)"), "broadmoney(m2b)");
        assert_eq!(stem("reservemoney(m0)(a)"), "reservemoney(m0)");
        assert_eq!(stem("netforeignassets(nfa)"), "netforeignassets(nfa)");
    }

    #[test]
    fn duplicate_mapping_is_ambiguous() {
        let map = HeaderMap::new(&PipelineConfig::default());
        let headers = vec!["Date".to_string(), "m1".to_string(), "Narrow Money (M1)".to_string()];
        let err = map.resolve(&headers, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousHeader { key: SeriesKey::M1, .. }));
    }

    #[test]
    fn missing_date_column_is_structural() {
        let map = HeaderMap::new(&PipelineConfig::default());
        let err = map.resolve(&["m1".to_string()], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingDateColumn));
    }

    #[test]
    fn missing_required_series_are_listed() {
        let map = HeaderMap::new(&PipelineConfig::default());
        let headers = vec!["Date".to_string(), "m1".to_string()];
        let err = map
            .resolve(&headers, &[SeriesKey::M0, SeriesKey::M1, SeriesKey::M2])
            .unwrap_err();
        match err {
            PipelineError::MissingRequiredSeries(keys) => {
                assert_eq!(keys, vec![SeriesKey::M0, SeriesKey::M2])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    #[case("2023-01-31", Some((2023, 1, 31)))]
    #[case("2023-01-31 00:00:00", Some((2023, 1, 31)))]
    #[case("2023-01-31 14:25:00", Some((2023, 1, 31)))]
    #[case("31/01/2023", Some((2023, 1, 31)))]
    #[case("31-Jan-2023", Some((2023, 1, 31)))]
    #[case("Jan-2023", Some((2023, 1, 1)))]
    #[case("March 2020", Some((2020, 3, 1)))]
    #[case("2020-07", Some((2020, 7, 1)))]
    #[case("not a date", None)]
    #[case("", None)]
    fn date_formats(#[case] input: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let cfg = PipelineConfig::default();
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(parse_date(&text(input), &cfg.date_formats), expected);
    }

    #[rstest]
    #[case(text("1234.5"), 1234.5)]
    #[case(text(" 1,234.5 "), 1234.5)]
    #[case(RawCell::Number(7.0), 7.0)]
    fn numeric_coercion(#[case] cell: RawCell, #[case] expected: f64) {
        assert_eq!(parse_number(&cell), expected);
    }

    #[rstest]
    #[case(text("n/a"))]
    #[case(text("-"))]
    #[case(RawCell::Empty)]
    fn non_numeric_cells_become_nan(#[case] cell: RawCell) {
        assert!(parse_number(&cell).is_nan());
    }

    #[test]
    fn normalize_sorts_keeps_undated_rows_and_recomputes_total() {
        let raw = RawTable {
            headers: vec![
                "Date".into(),
                "Reserve Money (M0)  (a)".into(),
                "Narrow Money (M1) \n(c)    \n (1) + (2)".into(),
                "Broad Money (M2) (b)".into(),
                "Broad Money (M2b) \n(d)            \n (3) + (4)".into(),
                "Total".into(),
            ],
            rows: vec![
                vec![text("2020-02-29"), text("5"), text("10"), text("20"), text("30"), text("999")],
                vec![text("garbage"), text("1"), text("1"), text("1"), text("1"), text("999")],
                vec![text("2020-01-31"), text("4"), text("x"), text("20"), text("30"), text("999")],
            ],
        };
        let ds = normalize(&raw, &PipelineConfig::default()).unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[0].date, NaiveDate::from_ymd_opt(2020, 1, 31));
        assert_eq!(ds.records[1].date, NaiveDate::from_ymd_opt(2020, 2, 29));
        assert_eq!(ds.records[2].date, None);

        let total = ds.series(&SeriesId::Total).unwrap();
        assert!(total[0].is_nan());
        assert_eq!(total[1], 60.0);
        assert_eq!(total[2], 3.0);
        assert_eq!(ds.columns.last(), Some(&SeriesId::Total));
    }
}
