//! Lazy, filter-pushdown reads over the partitioned store.
//!
//! A [`Scan`] only describes what to read. Partitions are pruned by ticker and
//! year when [`Scan::rows`] or [`Scan::collect`] runs, and only the surviving
//! files are opened.

pub mod table;

use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::debug;

use crate::error::StoreResult;
use crate::models::{AsOf, Config, DataKind, PriceRow, StatementPeriod, StatementRow};
use crate::storage::partition::{self, read_rows, ticker_dir, ticker_dirs, validate_ticker};
pub use table::{Table, Value};

/// A row type stored in a partitioned dataset
pub trait Record: DeserializeOwned {
    /// Every column, in schema order
    const COLUMNS: &'static [&'static str];
    /// Columns a projection always keeps
    const KEY_COLUMNS: &'static [&'static str];

    fn ticker(&self) -> &str;

    /// Date the date-range filters apply to
    fn date_key(&self) -> NaiveDate;

    fn value(&self, column: &str) -> Value;
}

impl Record for PriceRow {
    const COLUMNS: &'static [&'static str] = &[
        "ticker",
        "date",
        "open",
        "high",
        "low",
        "close",
        "adjusted_close",
        "volume",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["ticker", "date"];

    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date_key(&self) -> NaiveDate {
        self.date
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "ticker" => Value::Text(self.ticker.clone()),
            "date" => Value::Date(self.date),
            "open" => Value::Float(self.open),
            "high" => Value::Float(self.high),
            "low" => Value::Float(self.low),
            "close" => Value::Float(self.close),
            "adjusted_close" => Value::Float(self.adjusted_close),
            "volume" => Value::Int(self.volume),
            _ => Value::Null,
        }
    }
}

impl Record for StatementRow {
    const COLUMNS: &'static [&'static str] = &[
        "ticker",
        "fiscal_year",
        "fiscal_period",
        "revenue",
        "gross_profit",
        "operating_income",
        "net_income",
        "eps",
        "shares_outstanding",
        "rd_expense",
        "capex",
        "operating_cash_flow",
        "free_cash_flow",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["ticker"];

    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date_key(&self) -> NaiveDate {
        self.fiscal_period
    }

    fn value(&self, column: &str) -> Value {
        match column {
            "ticker" => Value::Text(self.ticker.clone()),
            "fiscal_year" => Value::Int(i64::from(self.fiscal_year)),
            "fiscal_period" => Value::Date(self.fiscal_period),
            "revenue" => self.revenue.into(),
            "gross_profit" => self.gross_profit.into(),
            "operating_income" => self.operating_income.into(),
            "net_income" => self.net_income.into(),
            "eps" => self.eps.into(),
            "shares_outstanding" => self.shares_outstanding.into(),
            "rd_expense" => self.rd_expense.into(),
            "capex" => self.capex.into(),
            "operating_cash_flow" => self.operating_cash_flow.into(),
            "free_cash_flow" => self.free_cash_flow.into(),
            _ => Value::Null,
        }
    }
}

/// Deferred read over one dataset. Date bounds are inclusive.
pub struct Scan<R> {
    base: PathBuf,
    kind: DataKind,
    ticker: Option<String>,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    columns: Option<Vec<String>>,
    _row: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for Scan<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("kind", &self.kind)
            .field("ticker", &self.ticker)
            .field("since", &self.since)
            .field("until", &self.until)
            .field("columns", &self.columns)
            .finish()
    }
}

impl<R: Record> Scan<R> {
    fn new(base: PathBuf, kind: DataKind) -> Self {
        Self {
            base,
            kind,
            ticker: None,
            since: None,
            until: None,
            columns: None,
            _row: PhantomData,
        }
    }

    pub fn ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }

    pub fn since(mut self, start: NaiveDate) -> Self {
        self.since = Some(start);
        self
    }

    pub fn until(mut self, end: NaiveDate) -> Self {
        self.until = Some(end);
        self
    }

    /// Restrict `collect` to `columns`; key columns are always kept
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Columns `collect` will produce, in order
    pub fn projection(&self) -> Vec<String> {
        let Some(requested) = &self.columns else {
            return R::COLUMNS.iter().map(|c| c.to_string()).collect();
        };

        let mut projection: Vec<String> = R::KEY_COLUMNS
            .iter()
            .filter(|key| !requested.iter().any(|c| c == *key))
            .map(|key| key.to_string())
            .collect();
        for column in requested {
            if !R::COLUMNS.contains(&column.as_str()) {
                debug!("Dropping unknown column '{}' from {} projection", column, self.kind);
                continue;
            }
            if !projection.contains(column) {
                projection.push(column.clone());
            }
        }
        projection
    }

    /// Partition files that survive ticker and year pruning
    pub fn files(&self) -> StoreResult<Vec<PathBuf>> {
        let min_year = self.since.map(|d| d.year());
        let max_year = self.until.map(|d| d.year());

        let tickers = match &self.ticker {
            Some(ticker) => {
                validate_ticker(ticker)?;
                let path = ticker_dir(&self.base, ticker);
                if path.is_dir() {
                    vec![(ticker.clone(), path)]
                } else {
                    Vec::new()
                }
            }
            None => ticker_dirs(&self.base)?,
        };

        let mut files = Vec::new();
        for (_, path) in tickers {
            files.extend(partition::data_files(self.kind, &path, min_year, max_year)?);
        }
        Ok(files)
    }

    /// Execute the scan, returning full rows ordered by ticker then date
    pub fn rows(&self) -> StoreResult<Vec<R>> {
        let files = self.files()?;
        debug!("Scanning {} {} partition files", files.len(), self.kind);

        let mut rows = Vec::new();
        for file in &files {
            let batch: Vec<R> = read_rows(file)?;
            rows.extend(batch.into_iter().filter(|row| self.matches(row)));
        }
        rows.sort_by(|a, b| {
            a.ticker()
                .cmp(b.ticker())
                .then_with(|| a.date_key().cmp(&b.date_key()))
        });
        Ok(rows)
    }

    /// Execute the scan into a table holding only the projected columns
    pub fn collect(&self) -> StoreResult<Table> {
        let columns = self.projection();
        let rows = self.rows()?;

        let mut table = Table::new(columns.clone());
        for row in &rows {
            table.push_row(columns.iter().map(|c| row.value(c)).collect());
        }
        Ok(table)
    }

    fn matches(&self, row: &R) -> bool {
        if self.ticker.as_deref().is_some_and(|t| t != row.ticker()) {
            return false;
        }
        let date = row.date_key();
        if self.since.is_some_and(|start| date < start) {
            return false;
        }
        if self.until.is_some_and(|end| date > end) {
            return false;
        }
        true
    }
}

/// Read access to the store rooted at `config.data_path`
#[derive(Debug, Clone)]
pub struct DataReader {
    config: Config,
}

impl DataReader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn prices(&self) -> Scan<PriceRow> {
        Scan::new(self.config.prices_path(), DataKind::Prices)
    }

    pub fn quarterly(&self) -> Scan<StatementRow> {
        self.statements(StatementPeriod::Quarterly)
    }

    pub fn annual(&self) -> Scan<StatementRow> {
        self.statements(StatementPeriod::Annual)
    }

    pub fn statements(&self, period: StatementPeriod) -> Scan<StatementRow> {
        Scan::new(self.config.kind_path(period.kind()), period.kind())
    }

    /// Most recent price row for `ticker`
    pub fn latest_price(&self, ticker: &str) -> StoreResult<Option<PriceRow>> {
        self.latest_price_as_of(ticker, AsOf::Latest)
    }

    /// Most recent price row on or before `as_of`
    pub fn latest_price_as_of(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<PriceRow>> {
        let mut scan = self.prices().ticker(ticker);
        if let Some(date) = as_of.date() {
            scan = scan.until(date);
        }
        Ok(scan.rows()?.pop())
    }

    /// First and last stored price dates for `ticker`
    pub fn date_range(&self, ticker: &str) -> StoreResult<(Option<NaiveDate>, Option<NaiveDate>)> {
        let rows = self.prices().ticker(ticker).rows()?;
        Ok((rows.first().map(|r| r.date), rows.last().map(|r| r.date)))
    }

    pub fn list_tickers(&self, kind: DataKind) -> StoreResult<Vec<String>> {
        partition::list_tickers(&self.config.kind_path(kind), kind)
    }

    pub fn has_data(&self, ticker: &str, kind: DataKind) -> StoreResult<bool> {
        partition::has_data(&self.config.kind_path(kind), ticker, kind)
    }
}
