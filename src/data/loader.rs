use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type,
};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;

use super::model::Dataset;
use super::schema::{normalize, RawCell, RawTable};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load and normalize a monetary statistics file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – one header row, one row per month (the published layout)
/// * `.parquet` – flat columns: a date column (Utf8, Date32 or Timestamp)
///   plus numeric series columns
pub fn load_file(path: &Path, config: &PipelineConfig) -> Result<Dataset> {
    log::info!("Loading {}", path.display());
    let raw = read_table(path, config)?;
    normalize(&raw, config)
}

/// Read a file into a [`RawTable`] without interpreting it.
pub fn read_table(path: &Path, config: &PipelineConfig) -> Result<RawTable> {
    match extension(path).as_str() {
        "csv" | "txt" => read_csv(File::open(path)?, config),
        "parquet" | "pq" => read_parquet(path),
        other => Err(PipelineError::UnsupportedFormat(other.to_string())),
    }
}

/// Same as [`load_file`] for a source whose bytes are already in memory.
/// `path` only selects the format; the file is not opened again.
pub fn load_bytes(path: &Path, bytes: &[u8], config: &PipelineConfig) -> Result<Dataset> {
    let raw = match extension(path).as_str() {
        "csv" | "txt" => read_csv(bytes, config)?,
        "parquet" | "pq" => read_parquet_from(Bytes::copy_from_slice(bytes))?,
        other => return Err(PipelineError::UnsupportedFormat(other.to_string())),
    };
    normalize(&raw, config)
}

/// Configured delimiter as a byte; multi-byte characters fall back to `,`.
fn delimiter_byte(config: &PipelineConfig) -> u8 {
    u8::try_from(config.delimiter).unwrap_or_else(|_| {
        log::warn!("Delimiter {:?} is not a single byte, using ','", config.delimiter);
        b','
    })
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// Read delimited text. Rows may be ragged and may hold invalid UTF-8; both
/// are tolerated at the cell level.
pub fn read_csv<R: Read>(input: R, config: &PipelineConfig) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(config))
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();

    let mut rows = Vec::new();
    for result in reader.byte_records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    let text = String::from_utf8_lossy(field);
                    if text.trim().is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(text.into_owned())
                    }
                })
                .collect(),
        );
    }

    log::debug!("Read {} CSV rows, {} columns", rows.len(), headers.len());
    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Read a flat Parquet table written by pandas (`df.to_parquet()`) or
/// polars (`df.write_parquet()`).
pub fn read_parquet(path: &Path) -> Result<RawTable> {
    read_parquet_from(File::open(path)?)
}

/// Parquet from any chunk source: an open file or an in-memory buffer.
pub fn read_parquet_from<R: ChunkReader + 'static>(input: R) -> Result<RawTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(input)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        let columns = batch
            .columns()
            .iter()
            .map(as_date32_if_temporal)
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            rows.push(columns.iter().map(|col| extract_cell(col, row)).collect());
        }
    }

    log::debug!("Read {} Parquet rows, {} columns", rows.len(), headers.len());
    Ok(RawTable { headers, rows })
}

// -- Arrow helpers --

/// Timestamps and Date64 are truncated to calendar days.
fn as_date32_if_temporal(col: &ArrayRef) -> Result<ArrayRef> {
    match col.data_type() {
        DataType::Timestamp(_, _) | DataType::Date64 => Ok(cast(col.as_ref(), &DataType::Date32)?),
        _ => Ok(col.clone()),
    }
}

/// Extract a single cell from an Arrow column.
fn extract_cell(col: &ArrayRef, row: usize) -> RawCell {
    if col.is_null(row) {
        return RawCell::Empty;
    }
    match col.data_type() {
        DataType::Utf8 => RawCell::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => RawCell::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Float64 => RawCell::Number(col.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => RawCell::Number(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Int64 => RawCell::Number(col.as_primitive::<Int64Type>().value(row) as f64),
        DataType::Int32 => RawCell::Number(col.as_primitive::<Int32Type>().value(row) as f64),
        DataType::Date32 => col
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(RawCell::Date)
            .unwrap_or(RawCell::Empty),
        other => {
            log::debug!("Unsupported Parquet column type {other:?}, cell treated as empty");
            RawCell::Empty
        }
    }
}

// ---------------------------------------------------------------------------
// CSV writer (download of a filtered view)
// ---------------------------------------------------------------------------

/// Write a dataset in the delimited format it was read from: a `date`
/// column (ISO 8601) followed by one column per series, headed by its
/// semantic key, separated by the configured delimiter. Missing values are
/// written as empty cells.
pub fn write_csv<W: Write>(dataset: &Dataset, output: W, config: &PipelineConfig) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(config))
        .from_writer(output);

    let mut header = vec!["date".to_string()];
    header.extend(dataset.columns.iter().map(|id| id.to_string()));
    writer.write_record(&header)?;

    for record in &dataset.records {
        let mut row = Vec::with_capacity(header.len());
        row.push(
            record
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        );
        for id in &dataset.columns {
            let value = record.get(id);
            row.push(if value.is_nan() {
                String::new()
            } else {
                value.to_string()
            });
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a dataset to a CSV file.
pub fn export_csv(dataset: &Dataset, path: &Path, config: &PipelineConfig) -> Result<()> {
    write_csv(dataset, File::create(path)?, config)?;
    log::info!("Exported {} rows to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{SeriesId, SeriesKey};
    use chrono::NaiveDate;
    use std::sync::Arc;

    const PUBLISHED: &str = "\
,Date,Reserve Money (M0)  (a),\"Narrow Money (M1) \n(c)    \n (1) + (2)\",Broad Money (M2) (b),\"Broad Money (M2b) \n(d)            \n (3) + (4)\",Net Foreign Assets of Commercial Banks
0,2020-02-29 00:00:00,110,\"1,210\",3100,3300,-4
1,2020-01-31 00:00:00,100,1200,3000,3200,n/a
2,,90,1100,2900,3100,5
";

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn reads_published_layout() {
        let ds = normalize(&read_csv(PUBLISHED.as_bytes(), &config()).unwrap(), &config()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[0].date, NaiveDate::from_ymd_opt(2020, 1, 31));
        assert_eq!(ds.records[1].get(&SeriesKey::M1.into()), 1210.0);
        assert!(ds.records[0].get(&SeriesKey::NfaCommercialBanks.into()).is_nan());
        assert_eq!(ds.records[2].date, None);
        assert_eq!(ds.records[1].get(&SeriesId::Total), 1210.0 + 3100.0 + 3300.0);
    }

    #[test]
    fn semicolon_delimiter_from_config() {
        let mut cfg = config();
        cfg.delimiter = ';';
        let raw = read_csv("date;m0;m1;m2;m2b\n2021-03-01;1;2;3;4\n".as_bytes(), &cfg).unwrap();
        assert_eq!(raw.headers.len(), 5);
        let ds = normalize(&raw, &cfg).unwrap();
        assert_eq!(ds.records[0].get(&SeriesId::Total), 9.0);

        // the download keeps the source delimiter and reads back identically
        let mut buffer = Vec::new();
        write_csv(&ds, &mut buffer, &cfg).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("date;m0;m1;m2;m2b;total\n"));
        let reread = normalize(&read_csv(buffer.as_slice(), &cfg).unwrap(), &cfg).unwrap();
        assert_eq!(reread, ds);
    }

    #[test]
    fn csv_round_trip_preserves_canonical_fields() {
        let cfg = config();
        let ds = normalize(&read_csv(PUBLISHED.as_bytes(), &cfg).unwrap(), &cfg).unwrap();

        let mut buffer = Vec::new();
        write_csv(&ds, &mut buffer, &cfg).unwrap();
        let reread = normalize(&read_csv(buffer.as_slice(), &cfg).unwrap(), &cfg).unwrap();

        assert_eq!(reread, ds);
    }

    #[test]
    fn unsupported_extension() {
        let err = load_file(Path::new("stats.xlsx"), &config()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(ext) if ext == "xlsx"));
    }

    #[test]
    fn load_and_export_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("stats.csv");
        std::fs::write(&src, PUBLISHED).unwrap();

        let ds = load_file(&src, &config()).unwrap();
        let out = dir.path().join("filtered.csv");
        export_csv(&ds, &out, &config()).unwrap();
        assert_eq!(load_file(&out, &config()).unwrap(), ds);
    }

    /// Three rows, out of date order, one undated, `m1` missing in one row.
    fn write_sample_parquet(path: &Path) {
        use arrow::array::{Date32Array, Float64Array, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let schema = Arc::new(Schema::new(vec![
            Field::new("Date", DataType::Date32, true),
            Field::new("m0", DataType::Float64, true),
            Field::new("m1", DataType::Float64, true),
            Field::new("m2", DataType::Float64, true),
            Field::new("m2b", DataType::Float64, true),
            Field::new("note", DataType::Utf8, true),
        ]));
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let days = |y, m, d| (NaiveDate::from_ymd_opt(y, m, d).unwrap() - epoch).num_days() as i32;
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Date32Array::from(vec![Some(days(2024, 2, 1)), Some(days(2024, 1, 1)), None])),
                Arc::new(Float64Array::from(vec![Some(1.0), Some(2.0), Some(3.0)])),
                Arc::new(Float64Array::from(vec![Some(10.0), None, Some(30.0)])),
                Arc::new(Float64Array::from(vec![20.0, 20.0, 20.0])),
                Arc::new(Float64Array::from(vec![30.0, 30.0, 30.0])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap();

        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_flat_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.parquet");
        write_sample_parquet(&path);

        let ds = load_file(&path, &config()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[0].date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(ds.records[0].get(&SeriesKey::M1.into()).is_nan());
        assert!(ds.records[0].get(&SeriesId::Total).is_nan());
        assert_eq!(ds.records[1].get(&SeriesId::Total), 60.0);
        assert_eq!(ds.records[2].date, None);
    }

    #[test]
    fn parquet_bytes_are_parsed_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.parquet");
        write_sample_parquet(&path);
        let bytes = std::fs::read(&path).unwrap();

        // the file changing on disk does not affect the hashed buffer
        std::fs::write(&path, b"not parquet").unwrap();
        let ds = load_bytes(&path, &bytes, &config()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records[1].get(&SeriesId::Total), 60.0);
    }
}
