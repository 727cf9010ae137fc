//! Partitioned CSV store for daily prices and financial statements.
//!
//! Prices are partitioned by `(ticker, year)`, statements by `ticker` alone.
//! Writes replace whole partition files; there is no locking, so callers must
//! serialize writers per partition.

pub mod partition;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{Config, DataKind, PriceRow, StatementPeriod, StatementRow};
use partition::{read_rows, ticker_dir, validate_ticker, write_rows, year_dir, DATA_FILE};

#[derive(Debug, Clone)]
pub struct PartitionedStore {
    config: Config,
}

impl PartitionedStore {
    /// Open the store rooted at `config.data_path`, creating the dataset directories
    pub fn new(config: Config) -> StoreResult<Self> {
        for path in [
            config.prices_path(),
            config.fundamentals_quarterly_path(),
            config.fundamentals_annual_path(),
            config.metadata_path(),
        ] {
            fs::create_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        debug!("Partitioned store opened at {}", config.data_path.display());
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fully rewrite the price partitions touched by `rows`, one file per year.
    ///
    /// Returns the files written; empty input writes nothing.
    pub fn write_prices(&self, rows: &[PriceRow], ticker: &str) -> StoreResult<Vec<PathBuf>> {
        validate_ticker(ticker)?;
        if rows.is_empty() {
            warn!("Empty price batch for {}, skipping write", ticker);
            return Ok(Vec::new());
        }
        check_tickers(rows.iter().map(|r| r.ticker.as_str()), ticker)?;

        let by_year = split_by_year(rows);
        let base = self.config.prices_path();
        let mut written = Vec::with_capacity(by_year.len());

        for (year, mut year_rows) in by_year {
            year_rows.sort_by_key(|r| r.date);
            let file = year_dir(&base, ticker, year).join(DATA_FILE);
            write_rows(&file, &year_rows)?;
            debug!("Wrote {} rows to {}", year_rows.len(), file.display());
            written.push(file);
        }

        info!("💾 Wrote {} prices: {} rows across {} years", ticker, rows.len(), written.len());
        Ok(written)
    }

    /// Fully rewrite the quarterly or annual statement partition for `ticker`.
    /// Rows repeating a fiscal period keep only the last occurrence.
    pub fn write_statements(
        &self,
        rows: &[StatementRow],
        ticker: &str,
        period: StatementPeriod,
    ) -> StoreResult<Option<PathBuf>> {
        validate_ticker(ticker)?;
        if rows.is_empty() {
            warn!("Empty {} fundamentals for {}, skipping write", period.as_str(), ticker);
            return Ok(None);
        }
        check_tickers(rows.iter().map(|r| r.ticker.as_str()), ticker)?;

        let sorted = dedup_statements(rows);
        if sorted.len() < rows.len() {
            warn!(
                "{}: dropped {} duplicate {} statement rows",
                ticker,
                rows.len() - sorted.len(),
                period.as_str()
            );
        }

        let file = ticker_dir(&self.config.kind_path(period.kind()), ticker).join(DATA_FILE);
        write_rows(&file, &sorted)?;

        info!("💾 Wrote {} {} fundamentals: {} rows", ticker, period.as_str(), sorted.len());
        Ok(Some(file))
    }

    /// Merge new price rows into existing year partitions.
    ///
    /// Per year: existing rows followed by the new rows, deduplicated by date
    /// with the later occurrence winning, sorted ascending by date. Running the
    /// same append twice leaves the partition unchanged.
    pub fn append_prices(&self, rows: &[PriceRow], ticker: &str) -> StoreResult<Vec<PathBuf>> {
        validate_ticker(ticker)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_tickers(rows.iter().map(|r| r.ticker.as_str()), ticker)?;

        let base = self.config.prices_path();
        let mut written = Vec::new();

        for (year, new_rows) in split_by_year(rows) {
            let file = year_dir(&base, ticker, year).join(DATA_FILE);
            let existing: Vec<PriceRow> = if file.is_file() {
                read_rows(&file)?
            } else {
                Vec::new()
            };
            let existing_count = existing.len();

            let merged = merge_by_date(existing, new_rows);
            write_rows(&file, &merged)?;
            debug!(
                "Updated {}/{}: {} existing rows, now {} rows",
                ticker,
                year,
                existing_count,
                merged.len()
            );
            written.push(file);
        }

        Ok(written)
    }

    /// Store a named metadata table under `metadata/<name>.csv`
    pub fn write_metadata<T: Serialize>(&self, name: &str, rows: &[T]) -> StoreResult<PathBuf> {
        let file = self.metadata_file(name)?;
        write_rows(&file, rows)?;
        info!("💾 Wrote metadata '{}': {} rows", name, rows.len());
        Ok(file)
    }

    /// Read a named metadata table; a missing file reads as empty
    pub fn read_metadata<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Vec<T>> {
        let file = self.metadata_file(name)?;
        if !file.is_file() {
            warn!("Metadata file not found: {}", file.display());
            return Ok(Vec::new());
        }
        read_rows(&file)
    }

    /// Tickers with at least one persisted partition file of `kind`
    pub fn list_partitions(&self, kind: DataKind) -> StoreResult<Vec<String>> {
        partition::list_tickers(&self.config.kind_path(kind), kind)
    }

    /// True when at least one non-empty partition file exists for `ticker`
    pub fn exists(&self, ticker: &str, kind: DataKind) -> StoreResult<bool> {
        partition::has_data(&self.config.kind_path(kind), ticker, kind)
    }

    /// Remove every partition group (prices, quarterly, annual) for `ticker`.
    ///
    /// Returns how many groups existed and were removed.
    pub fn delete(&self, ticker: &str) -> StoreResult<usize> {
        validate_ticker(ticker)?;
        let mut deleted = 0;
        for kind in DataKind::ALL {
            let path = ticker_dir(&self.config.kind_path(kind), ticker);
            if path.exists() {
                fs::remove_dir_all(&path).map_err(|e| StoreError::io(&path, e))?;
                deleted += 1;
                info!("🗑️ Deleted {}", path.display());
            }
        }
        Ok(deleted)
    }

    fn metadata_file(&self, name: &str) -> StoreResult<PathBuf> {
        if validate_ticker(name).is_err() || name.contains('.') {
            return Err(StoreError::InvalidMetadataName(name.to_string()));
        }
        Ok(self.config.metadata_path().join(format!("{}.csv", name)))
    }
}

fn check_tickers<'a>(mut tickers: impl Iterator<Item = &'a str>, expected: &str) -> StoreResult<()> {
    match tickers.find(|t| *t != expected) {
        Some(found) => Err(StoreError::TickerMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        None => Ok(()),
    }
}

fn split_by_year(rows: &[PriceRow]) -> BTreeMap<i32, Vec<PriceRow>> {
    let mut by_year: BTreeMap<i32, Vec<PriceRow>> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.year()).or_default().push(row.clone());
    }
    by_year
}

/// Concatenate `existing` and `incoming`, keep the last row seen per date, sort by date
/// One row per fiscal period, later rows winning, sorted by period end
fn dedup_statements(rows: &[StatementRow]) -> Vec<StatementRow> {
    let mut by_period: BTreeMap<(NaiveDate, i32), StatementRow> = BTreeMap::new();
    for row in rows {
        by_period.insert((row.fiscal_period, row.fiscal_year), row.clone());
    }
    by_period.into_values().collect()
}

fn merge_by_date(existing: Vec<PriceRow>, incoming: Vec<PriceRow>) -> Vec<PriceRow> {
    let mut by_date: BTreeMap<NaiveDate, PriceRow> = BTreeMap::new();
    for row in existing.into_iter().chain(incoming) {
        by_date.insert(row.date, row);
    }
    by_date.into_values().collect()
}
