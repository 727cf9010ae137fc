//! Full and incremental loads from a [`DataSource`] into the partitioned store.

pub mod simfin;
pub mod source;
pub mod validation;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::StoreResult;
use crate::models::{Config, DataKind, PriceRow, StatementPeriod, StatementRow};
use crate::query::DataReader;
use crate::storage::PartitionedStore;
pub use simfin::SimFinBulkSource;
pub use source::DataSource;
pub use validation::{ValidationReport, ValidationResult};

/// Metadata table holding the provider's company list
pub const COMPANIES_METADATA: &str = "companies";

/// Number of tickers sampled by [`DataIngestion::data_summary`]
const SUMMARY_SAMPLE_SIZE: usize = 5;

/// Large-cap S&P 500 constituents loaded by [`DataIngestion::download_sp500`]
pub const SP500_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "NVDA", "GOOGL", "META", "TSLA", "BRK.B", "UNH", "JNJ", "JPM", "V",
    "PG", "XOM", "HD", "CVX", "MA", "ABBV", "MRK", "LLY", "PFE", "KO", "PEP", "COST", "AVGO",
    "TMO", "MCD", "WMT", "CSCO", "ACN", "ABT", "DHR", "NEE", "VZ", "ADBE", "NKE", "TXN", "PM",
    "CMCSA", "CRM", "INTC", "AMD", "ORCL", "IBM", "QCOM", "HON", "UNP", "LOW", "AMGN", "SBUX",
];

/// Provider symbols used when the listed share class is absent
const SP500_ALTERNATES: &[(&str, &str)] = &[("GOOGL", "GOOG"), ("BRK.B", "BRK-B")];

/// S&P 500 tickers present in `available`, sorted. A missing symbol with a
/// known alternate share class is replaced by the alternate when that exists.
pub fn sp500_universe(available: &[String]) -> Vec<String> {
    let has = |ticker: &str| available.iter().any(|t| t == ticker);

    let mut universe: Vec<String> = SP500_TICKERS
        .iter()
        .filter(|t| has(t))
        .map(|t| t.to_string())
        .collect();
    for (listed, alternate) in SP500_ALTERNATES {
        if !has(listed) && has(alternate) {
            universe.push(alternate.to_string());
        }
    }
    universe.sort();
    universe
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionSummary {
    pub tickers_processed: usize,
    pub prices_written: usize,
    pub fundamentals_written: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncrementalSummary {
    pub tickers_updated: usize,
    pub new_records: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSummary {
    pub price_tickers: usize,
    pub quarterly_tickers: usize,
    pub annual_tickers: usize,
    pub sample_date_ranges: BTreeMap<String, DateRange>,
}

/// Loads provider data into the store
pub struct DataIngestion<S: DataSource> {
    source: S,
    store: PartitionedStore,
    reader: DataReader,
    config: Config,
}

impl<S: DataSource> DataIngestion<S> {
    pub fn new(config: Config, source: S) -> Result<Self> {
        let store = PartitionedStore::new(config.clone())?;
        Ok(Self {
            source,
            store,
            reader: DataReader::new(config.clone()),
            config,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    /// S&P 500 tickers the source has price data for
    pub fn sp500_tickers(&self) -> Result<Vec<String>> {
        let available = self.source.available_tickers()?;
        let universe = sp500_universe(&available);
        info!(
            "📊 Found {}/{} S&P 500 tickers available",
            universe.len(),
            SP500_TICKERS.len()
        );
        Ok(universe)
    }

    /// Full load, fundamentals included, of the available S&P 500 tickers
    pub fn download_sp500(&self, start_date: Option<NaiveDate>) -> Result<IngestionSummary> {
        let tickers = self.sp500_tickers()?;
        if tickers.is_empty() {
            warn!("No S&P 500 tickers available from source");
            let mut summary = IngestionSummary::default();
            summary.errors.push("No S&P 500 tickers available".to_string());
            return Ok(summary);
        }
        self.update_all_data(Some(&tickers), start_date, true)
    }

    /// Rewrite prices (and optionally statements) for `tickers`, defaulting to
    /// every ticker the source has prices for. Prices before `start_date`
    /// (default `Config::default_start_date`) are dropped.
    pub fn update_all_data(
        &self,
        tickers: Option<&[String]>,
        start_date: Option<NaiveDate>,
        include_fundamentals: bool,
    ) -> Result<IngestionSummary> {
        let started = Instant::now();
        let mut summary = IngestionSummary::default();

        let universe = match tickers {
            Some(tickers) => tickers.to_vec(),
            None => {
                let tickers = self.source.available_tickers()?;
                info!("📊 Found {} tickers with price data", tickers.len());
                tickers
            }
        };
        let start_date = start_date.unwrap_or(self.config.default_start_date);

        info!("📈 Loading price data...");
        let all_prices = self.source.price_rows()?;
        if all_prices.is_empty() {
            error!("No price data available");
            summary.errors.push("No price data available".to_string());
            return Ok(summary);
        }
        let prices = group_by_ticker(
            all_prices.into_iter().filter(|r| r.date >= start_date),
            |r: &PriceRow| r.ticker.as_str(),
        );

        let (quarterly, annual) = if include_fundamentals {
            info!("📊 Loading quarterly fundamentals...");
            let quarterly = self.source.statement_rows(StatementPeriod::Quarterly)?;
            info!("📊 Loading annual fundamentals...");
            let annual = self.source.statement_rows(StatementPeriod::Annual)?;
            (
                group_by_ticker(quarterly, |r: &StatementRow| r.ticker.as_str()),
                group_by_ticker(annual, |r: &StatementRow| r.ticker.as_str()),
            )
        } else {
            (HashMap::new(), HashMap::new())
        };

        match self.source.companies() {
            Ok(companies) if !companies.is_empty() => {
                if let Err(e) = self.store.write_metadata(COMPANIES_METADATA, &companies) {
                    warn!("Failed to store company metadata: {}", e);
                    summary.errors.push(format!("companies: {}", e));
                }
            }
            Ok(_) => debug!("Source returned no company metadata"),
            Err(e) => {
                warn!("Failed to load company metadata: {}", e);
                summary.errors.push(format!("companies: {}", e));
            }
        }

        for ticker in &universe {
            let result = self.write_ticker(
                ticker,
                prices.get(ticker.as_str()),
                quarterly.get(ticker.as_str()),
                annual.get(ticker.as_str()),
            );

            match result {
                Ok((prices_written, fundamentals_written)) => {
                    summary.prices_written += prices_written;
                    summary.fundamentals_written += fundamentals_written;
                    summary.tickers_processed += 1;
                    if summary.tickers_processed % self.config.batch_size.max(1) == 0 {
                        info!("Processed {}/{} tickers", summary.tickers_processed, universe.len());
                    }
                }
                Err(e) => {
                    error!("Error processing {}: {}", ticker, e);
                    summary.errors.push(format!("{}: {}", ticker, e));
                }
            }
        }

        info!(
            "✅ Ingestion complete: {} tickers, {} prices, {} fundamentals in {:.1}s",
            summary.tickers_processed,
            summary.prices_written,
            summary.fundamentals_written,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Append only prices newer than each ticker's stored max date.
    /// Tickers without stored prices are skipped.
    pub fn update_prices_incremental(&self, tickers: Option<&[String]>) -> Result<IncrementalSummary> {
        let mut summary = IncrementalSummary::default();

        let universe = match tickers {
            Some(tickers) => tickers.to_vec(),
            None => self.reader.list_tickers(DataKind::Prices)?,
        };
        if universe.is_empty() {
            warn!("No tickers to update");
            return Ok(summary);
        }

        info!("📈 Loading latest prices...");
        let all_prices = self.source.price_rows()?;
        if all_prices.is_empty() {
            error!("No price data available");
            return Ok(summary);
        }
        let prices = group_by_ticker(all_prices, |r: &PriceRow| r.ticker.as_str());

        for ticker in &universe {
            match self.append_new_prices(ticker, prices.get(ticker.as_str())) {
                Ok(0) => {}
                Ok(added) => {
                    summary.new_records += added;
                    summary.tickers_updated += 1;
                    debug!("{}: added {} new records", ticker, added);
                }
                Err(e) => {
                    error!("Error updating {}: {}", ticker, e);
                    summary.errors.push(format!("{}: {}", ticker, e));
                }
            }
        }

        info!(
            "✅ Incremental update: {} tickers, {} new records",
            summary.tickers_updated, summary.new_records
        );
        Ok(summary)
    }

    /// Ticker counts per dataset and date ranges for the first few price tickers
    pub fn data_summary(&self) -> StoreResult<DataSummary> {
        let price_tickers = self.reader.list_tickers(DataKind::Prices)?;

        let mut sample_date_ranges = BTreeMap::new();
        for ticker in price_tickers.iter().take(SUMMARY_SAMPLE_SIZE) {
            let (min_date, max_date) = self.reader.date_range(ticker)?;
            sample_date_ranges.insert(ticker.clone(), DateRange { min_date, max_date });
        }

        Ok(DataSummary {
            price_tickers: price_tickers.len(),
            quarterly_tickers: self.reader.list_tickers(DataKind::Quarterly)?.len(),
            annual_tickers: self.reader.list_tickers(DataKind::Annual)?.len(),
            sample_date_ranges,
        })
    }

    /// Write every dataset for one ticker, returning (price rows, quarterly rows).
    /// Counts are only reported once all writes have succeeded.
    fn write_ticker(
        &self,
        ticker: &str,
        prices: Option<&Vec<PriceRow>>,
        quarterly: Option<&Vec<StatementRow>>,
        annual: Option<&Vec<StatementRow>>,
    ) -> StoreResult<(usize, usize)> {
        let mut prices_written = 0;
        let mut fundamentals_written = 0;

        if let Some(rows) = prices.filter(|rows| !rows.is_empty()) {
            self.store.write_prices(rows, ticker)?;
            prices_written = rows.len();
        }
        if let Some(rows) = quarterly.filter(|rows| !rows.is_empty()) {
            self.store.write_statements(rows, ticker, StatementPeriod::Quarterly)?;
            fundamentals_written = rows.len();
        }
        if let Some(rows) = annual.filter(|rows| !rows.is_empty()) {
            self.store.write_statements(rows, ticker, StatementPeriod::Annual)?;
        }
        Ok((prices_written, fundamentals_written))
    }

    fn append_new_prices(&self, ticker: &str, prices: Option<&Vec<PriceRow>>) -> StoreResult<usize> {
        let (_, max_date) = self.reader.date_range(ticker)?;
        let Some(max_date) = max_date else {
            debug!("{}: no stored prices, skipping", ticker);
            return Ok(0);
        };

        let new_rows: Vec<PriceRow> = prices
            .map(|rows| rows.iter().filter(|r| r.date > max_date).cloned().collect())
            .unwrap_or_default();
        if new_rows.is_empty() {
            return Ok(0);
        }

        self.store.append_prices(&new_rows, ticker)?;
        Ok(new_rows.len())
    }
}

fn group_by_ticker<R>(
    rows: impl IntoIterator<Item = R>,
    ticker: impl Fn(&R) -> &str,
) -> HashMap<String, Vec<R>> {
    let mut grouped: HashMap<String, Vec<R>> = HashMap::new();
    for row in rows {
        let key = ticker(&row).to_string();
        grouped.entry(key).or_default().push(row);
    }
    grouped
}
