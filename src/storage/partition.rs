//! On-disk partition layout and file-level CSV primitives.
//!
//! ```text
//! <root>/prices/ticker=<TICKER>/year=<YYYY>/data.csv
//! <root>/fundamentals_quarterly/ticker=<TICKER>/data.csv
//! <root>/fundamentals_annual/ticker=<TICKER>/data.csv
//! <root>/metadata/<name>.csv
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::DataKind;

pub const DATA_FILE: &str = "data.csv";
const TICKER_KEY: &str = "ticker";
const YEAR_KEY: &str = "year";

/// Reject tickers that would escape or corrupt the `key=value` layout
pub fn validate_ticker(ticker: &str) -> StoreResult<()> {
    let invalid = ticker.trim().is_empty()
        || ticker != ticker.trim()
        || ticker == "."
        || ticker == ".."
        || ticker.contains(['/', '\\', '=', '\0']);
    if invalid {
        return Err(StoreError::InvalidTicker(ticker.to_string()));
    }
    Ok(())
}

pub fn ticker_dir(base: &Path, ticker: &str) -> PathBuf {
    base.join(format!("{}={}", TICKER_KEY, ticker))
}

pub fn year_dir(base: &Path, ticker: &str, year: i32) -> PathBuf {
    ticker_dir(base, ticker).join(format!("{}={}", YEAR_KEY, year))
}

/// Value of a `key=value` path segment, if the segment uses `key`
pub fn segment_value<'a>(segment: &'a str, key: &str) -> Option<&'a str> {
    segment
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .filter(|value| !value.is_empty())
}

/// All `ticker=<T>` directories under a dataset root, sorted by ticker.
/// A missing root is an empty store, not an error.
pub fn ticker_dirs(base: &Path) -> StoreResult<Vec<(String, PathBuf)>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(base).map_err(|e| StoreError::io(base, e))? {
        let entry = entry.map_err(|e| StoreError::io(base, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(ticker) = name.to_str().and_then(|n| segment_value(n, TICKER_KEY)) {
            dirs.push((ticker.to_string(), path));
        }
    }
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

/// Data files under one ticker directory.
///
/// Price partitions are pruned by year before anything is opened; statement
/// partitions hold a single file per ticker.
pub fn data_files(
    kind: DataKind,
    ticker_path: &Path,
    min_year: Option<i32>,
    max_year: Option<i32>,
) -> StoreResult<Vec<PathBuf>> {
    if kind != DataKind::Prices {
        let file = ticker_path.join(DATA_FILE);
        return Ok(if file.is_file() { vec![file] } else { Vec::new() });
    }

    let mut years = Vec::new();
    for entry in fs::read_dir(ticker_path).map_err(|e| StoreError::io(ticker_path, e))? {
        let entry = entry.map_err(|e| StoreError::io(ticker_path, e))?;
        let name = entry.file_name();
        let Some(year) = name
            .to_str()
            .and_then(|n| segment_value(n, YEAR_KEY))
            .and_then(|y| y.parse::<i32>().ok())
        else {
            continue;
        };

        if min_year.is_some_and(|min| year < min) || max_year.is_some_and(|max| year > max) {
            debug!("Pruned partition {}/year={}", ticker_path.display(), year);
            continue;
        }

        let file = entry.path().join(DATA_FILE);
        if file.is_file() {
            years.push((year, file));
        }
    }
    years.sort_by_key(|(year, _)| *year);
    Ok(years.into_iter().map(|(_, file)| file).collect())
}

/// Tickers of `kind` with at least one persisted partition file
pub fn list_tickers(base: &Path, kind: DataKind) -> StoreResult<Vec<String>> {
    let mut tickers = Vec::new();
    for (ticker, path) in ticker_dirs(base)? {
        if !data_files(kind, &path, None, None)?.is_empty() {
            tickers.push(ticker);
        }
    }
    Ok(tickers)
}

/// True when `ticker` has at least one non-empty partition file of `kind`
pub fn has_data(base: &Path, ticker: &str, kind: DataKind) -> StoreResult<bool> {
    validate_ticker(ticker)?;
    let path = ticker_dir(base, ticker);
    if !path.is_dir() {
        return Ok(false);
    }
    for file in data_files(kind, &path, None, None)? {
        let metadata = fs::metadata(&file).map_err(|e| StoreError::io(&file, e))?;
        if metadata.len() > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Read every row of one partition file
pub fn read_rows<R: DeserializeOwned>(path: &Path) -> StoreResult<Vec<R>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result.map_err(|e| StoreError::csv(path, e))?);
    }
    Ok(rows)
}

/// Replace a partition file with `rows`.
///
/// Rows go to a sibling temp file that is renamed over the target, so readers
/// see either the old or the new partition.
pub fn write_rows<R: Serialize>(path: &Path, rows: &[R]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut writer = csv::Writer::from_path(&tmp_path).map_err(|e| StoreError::csv(&tmp_path, e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| StoreError::csv(&tmp_path, e))?;
        }
        writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
