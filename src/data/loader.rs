//! CSV persistence for panels and walk-forward outputs.
//!
//! Reads the price/return CSVs produced by `binance-download` (first column
//! is the bar timestamp, one column per symbol afterwards) into validated
//! [`Panel`]s, and writes stitched series and fold-record tables back out.
//! All tabular I/O goes through polars.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::Array2;
use polars::prelude::*;
use thiserror::Error;

use crate::data::types::{Panel, PanelError, TimeSeries};
use crate::walkforward::{BlendFoldRecord, FoldRecord};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Panel(#[from] PanelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a panel CSV: timestamp index in the first column, one asset per
/// remaining column. Rows are sorted by timestamp.
pub fn load_panel_csv(path: &Path) -> Result<Panel, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }
    let df = CsvReader::from_path(path)?.has_header(true).finish()?;
    dataframe_to_panel(&df)
}

/// Load price and return panels from a data directory, restricted to their
/// common symbols.
pub fn load_panels(
    data_dir: &Path,
    prices_file: &str,
    returns_file: &str,
) -> Result<(Panel, Panel), LoaderError> {
    let prices = load_panel_csv(&data_dir.join(prices_file))?;
    let returns = load_panel_csv(&data_dir.join(returns_file))?;
    let common = prices.common_columns(&returns);
    if common.is_empty() {
        return Err(LoaderError::InvalidData(
            "price and return panels share no symbols".to_string(),
        ));
    }
    Ok((prices.select(&common)?, returns.select(&common)?))
}

fn dataframe_to_panel(df: &DataFrame) -> Result<Panel, LoaderError> {
    let names = df.get_column_names();
    let index_name = *names
        .first()
        .ok_or_else(|| LoaderError::InvalidData("CSV has no columns".to_string()))?;
    let asset_names: Vec<String> = names[1..].iter().map(|s| s.to_string()).collect();
    if asset_names.is_empty() {
        return Err(LoaderError::InvalidData(
            "CSV has no asset columns".to_string(),
        ));
    }

    let ts = df.column(index_name)?.str()?;
    let mut index = Vec::with_capacity(df.height());
    for value in ts.into_iter() {
        let raw = value
            .ok_or_else(|| LoaderError::InvalidData("missing timestamp".to_string()))?;
        index.push(parse_timestamp(raw)?);
    }

    let mut values = Array2::from_elem((df.height(), asset_names.len()), f64::NAN);
    for (j, name) in asset_names.iter().enumerate() {
        let column = df.column(name)?.cast(&DataType::Float64)?;
        for (i, value) in column.f64()?.into_iter().enumerate() {
            if let Some(v) = value {
                values[[i, j]] = v;
            }
        }
    }

    // Input files may arrive unsorted; Panel::new demands a strictly
    // increasing index.
    let mut order: Vec<usize> = (0..index.len()).collect();
    order.sort_by_key(|&i| index[i]);
    if order.iter().enumerate().any(|(pos, &i)| pos != i) {
        index = order.iter().map(|&i| index[i]).collect();
        values = values.select(ndarray::Axis(0), &order);
    }

    Ok(Panel::new(index, asset_names, values)?)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LoaderError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    Err(LoaderError::InvalidData(format!(
        "unparseable timestamp: {raw}"
    )))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%z").to_string()
}

/// Write a panel to CSV with the timestamp in the first column.
pub fn write_panel_csv(path: &Path, panel: &Panel) -> Result<(), LoaderError> {
    let timestamps: Vec<String> = panel.index().iter().map(format_timestamp).collect();
    let mut columns = vec![Series::new("timestamp", timestamps)];
    for (j, name) in panel.columns().iter().enumerate() {
        let values: Vec<f64> = panel.values().column(j).to_vec();
        columns.push(Series::new(name, values));
    }
    let mut df = DataFrame::new(columns)?;
    CsvWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Write a return series to CSV under the given value-column name.
pub fn write_series_csv(path: &Path, series: &TimeSeries, name: &str) -> Result<(), LoaderError> {
    let timestamps: Vec<String> = series.index().iter().map(format_timestamp).collect();
    let values: Vec<f64> = series.values().to_vec();
    let mut df = DataFrame::new(vec![
        Series::new("timestamp", timestamps),
        Series::new(name, values),
    ])?;
    CsvWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Write the single-sleeve fold table to CSV.
pub fn write_fold_records_csv(path: &Path, records: &[FoldRecord]) -> Result<(), LoaderError> {
    let mut df = df!(
        "fold" => records.iter().map(|r| r.fold as i64).collect::<Vec<_>>(),
        "mode" => records.iter().map(|r| r.mode.as_str().to_string()).collect::<Vec<_>>(),
        "train_start" => records.iter().map(|r| format_timestamp(&r.train_start)).collect::<Vec<_>>(),
        "train_end" => records.iter().map(|r| format_timestamp(&r.train_end)).collect::<Vec<_>>(),
        "test_start" => records.iter().map(|r| format_timestamp(&r.test_start)).collect::<Vec<_>>(),
        "test_end" => records.iter().map(|r| format_timestamp(&r.test_end)).collect::<Vec<_>>(),
        "train_days" => records.iter().map(|r| r.train_days).collect::<Vec<_>>(),
        "test_days" => records.iter().map(|r| r.test_days).collect::<Vec<_>>(),
        "cost_bps" => records.iter().map(|r| r.cost_bps).collect::<Vec<_>>(),
        "test_ann_ret" => records.iter().map(|r| r.test_ann_ret).collect::<Vec<_>>(),
        "test_ann_vol" => records.iter().map(|r| r.test_ann_vol).collect::<Vec<_>>(),
        "test_sharpe" => records.iter().map(|r| r.test_sharpe).collect::<Vec<_>>(),
    )?;
    CsvWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Write the blended fold table to CSV.
pub fn write_blend_records_csv(
    path: &Path,
    records: &[BlendFoldRecord],
) -> Result<(), LoaderError> {
    let mut df = df!(
        "fold" => records.iter().map(|r| r.fold as i64).collect::<Vec<_>>(),
        "mode" => records.iter().map(|r| r.mode.as_str().to_string()).collect::<Vec<_>>(),
        "train_start" => records.iter().map(|r| format_timestamp(&r.train_start)).collect::<Vec<_>>(),
        "train_end" => records.iter().map(|r| format_timestamp(&r.train_end)).collect::<Vec<_>>(),
        "test_start" => records.iter().map(|r| format_timestamp(&r.test_start)).collect::<Vec<_>>(),
        "test_end" => records.iter().map(|r| format_timestamp(&r.test_end)).collect::<Vec<_>>(),
        "train_days" => records.iter().map(|r| r.train_days).collect::<Vec<_>>(),
        "test_days" => records.iter().map(|r| r.test_days).collect::<Vec<_>>(),
        "policy" => records.iter().map(|r| r.policy.clone()).collect::<Vec<_>>(),
        "cost_bps" => records.iter().map(|r| r.cost_bps).collect::<Vec<_>>(),
        "weight_a" => records.iter().map(|r| r.weight_a).collect::<Vec<_>>(),
        "weight_b" => records.iter().map(|r| r.weight_b).collect::<Vec<_>>(),
        "test_ann_ret" => records.iter().map(|r| r.test_ann_ret).collect::<Vec<_>>(),
        "test_ann_vol" => records.iter().map(|r| r.test_ann_vol).collect::<Vec<_>>(),
        "test_sharpe" => records.iter().map(|r| r.test_sharpe).collect::<Vec<_>>(),
    )?;
    CsvWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn sample_panel() -> Panel {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let index = (0..3)
            .map(|i| start + chrono::Duration::hours(i))
            .collect();
        Panel::new(
            index,
            vec!["AAAUSDT".to_string(), "BBBUSDT".to_string()],
            array![[1.0, 2.0], [1.5, 2.5], [2.0, 3.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_panel_csv_round_trip() {
        let dir = std::env::temp_dir().join("statarb-loader-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("panel.csv");
        let panel = sample_panel();
        write_panel_csv(&path, &panel).unwrap();
        let loaded = load_panel_csv(&path).unwrap();
        assert_eq!(loaded.columns(), panel.columns());
        assert_eq!(loaded.index(), panel.index());
        assert_eq!(loaded.values(), panel.values());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = load_panel_csv(Path::new("/nonexistent/panel.csv"));
        assert!(matches!(result, Err(LoaderError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2023, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2023-01-01T05:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2023-01-01 05:00:00+0000").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("2023-01-01 05:00:00+00:00").unwrap(),
            expected
        );
        assert_eq!(parse_timestamp("2023-01-01 05:00:00").unwrap(), expected);
        assert!(parse_timestamp("not-a-time").is_err());
    }
}
