use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Date32Array, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Months, NaiveDate};
use clap::Parser;
use parquet::arrow::ArrowWriter;

use monetary_trends::data::schema::source_header;
use monetary_trends::SeriesKey;

/// Writes a deterministic monthly monetary survey (1995-2025) as CSV with
/// the published headers and as Parquet with semantic column names.
#[derive(Parser, Debug)]
struct Args {
    /// Output directory
    #[arg(default_value = ".")]
    out_dir: PathBuf,
}

const FIRST_YEAR: i32 = 1995;
const LAST_YEAR: i32 = 2025;

/// Smooth exponential growth with a mild seasonal swing.
fn trend(t: f64, base: f64, monthly_growth: f64, seasonal: f64) -> f64 {
    base * (1.0 + monthly_growth).powf(t) * (1.0 + seasonal * (2.0 * PI * t / 12.0).sin())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One month of the survey, in `SeriesKey::ALL` order.
fn month_values(t: f64) -> [f64; 18] {
    let currency = trend(t, 120.0, 0.0070, 0.030);
    let demand = trend(t, 90.0, 0.0075, 0.015);
    let m1 = currency + demand;
    let time_savings = trend(t, 260.0, 0.0085, 0.005);
    let m2 = m1 + time_savings;
    let m0 = currency * 1.35;

    // foreign assets swing around zero on a multi-year cycle
    let nfa_ma = 80.0 * (2.0 * PI * t / 96.0).sin() * (1.0 + 0.004 * t);
    let nfa_cb = 40.0 * (2.0 * PI * t / 60.0).cos() * (1.0 + 0.003 * t);
    let nfa = nfa_ma + nfa_cb;

    let ncg_central = trend(t, 60.0, 0.0060, 0.0);
    let ncg_commercial = trend(t, 80.0, 0.0080, 0.0);
    let ncg = ncg_central + ncg_commercial;
    let public_corps = trend(t, 25.0, 0.0050, 0.010);
    let private_sector = trend(t, 300.0, 0.0090, 0.008);
    let domestic_credit = ncg + public_corps + private_sector;

    let m2b = m2 * 1.12;
    let nda = m2b - nfa;
    let m2b_consolidated = nfa + nda;

    [
        m0,
        currency,
        demand,
        m1,
        time_savings,
        m2,
        m2b,
        nfa_ma,
        nfa_cb,
        nfa,
        ncg_central,
        ncg_commercial,
        ncg,
        public_corps,
        private_sector,
        domestic_credit,
        nda,
        m2b_consolidated,
    ]
    .map(round2)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let start = NaiveDate::from_ymd_opt(FIRST_YEAR, 1, 1).context("invalid start date")?;
    let months = ((LAST_YEAR - FIRST_YEAR + 1) * 12) as u32;
    let mut dates = Vec::with_capacity(months as usize);
    let mut rows = Vec::with_capacity(months as usize);
    for i in 0..months {
        let date = start
            .checked_add_months(Months::new(i))
            .context("date out of range")?;
        dates.push(date);
        rows.push(month_values(f64::from(i)));
    }

    // CSV, published layout
    let csv_path = args.out_dir.join("monetary_survey.csv");
    let mut writer = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;
    let mut header = vec!["Date".to_string()];
    header.extend(SeriesKey::ALL.iter().map(|k| source_header(*k).to_string()));
    writer.write_record(&header)?;
    for (date, values) in dates.iter().zip(&rows) {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        record.extend(values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    // Parquet, semantic column names
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("invalid epoch")?;
    let mut fields = vec![Field::new("date", DataType::Date32, false)];
    fields.extend(
        SeriesKey::ALL
            .iter()
            .map(|k| Field::new(k.as_str(), DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<ArrayRef> = vec![Arc::new(Date32Array::from(
        dates
            .iter()
            .map(|d| (*d - epoch).num_days() as i32)
            .collect::<Vec<_>>(),
    ))];
    for idx in 0..SeriesKey::ALL.len() {
        columns.push(Arc::new(Float64Array::from(
            rows.iter().map(|r| r[idx]).collect::<Vec<_>>(),
        )));
    }
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let parquet_path = args.out_dir.join("monetary_survey.parquet");
    let file = std::fs::File::create(&parquet_path)
        .with_context(|| format!("Failed to create {}", parquet_path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let last = dates.last().map(|d| d.year()).unwrap_or(LAST_YEAR);
    println!(
        "Wrote {} months ({FIRST_YEAR}-{last}) to {} and {}",
        dates.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
