use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::StoreError;

/// Daily OHLCV bar for one ticker, as stored in `prices/ticker=<T>/year=<Y>/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: i64,
}

impl PriceRow {
    /// Year partition this row belongs to
    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

/// One quarterly or annual financial statement period for a ticker.
///
/// Every numeric field is optional: a blank cell in the source means the
/// value was not reported, which is different from a reported zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub ticker: String,
    pub fiscal_year: i32,
    /// Period-end date; identifies the quarter and orders the history
    pub fiscal_period: NaiveDate,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub rd_expense: Option<f64>,
    pub capex: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

impl StatementRow {
    /// Empty statement for a period; fields are filled in by the caller
    pub fn new(ticker: &str, fiscal_year: i32, fiscal_period: NaiveDate) -> Self {
        Self {
            ticker: ticker.to_string(),
            fiscal_year,
            fiscal_period,
            revenue: None,
            gross_profit: None,
            operating_income: None,
            net_income: None,
            eps: None,
            shares_outstanding: None,
            rd_expense: None,
            capex: None,
            operating_cash_flow: None,
            free_cash_flow: None,
        }
    }

    /// Reported EPS, falling back to net income over shares outstanding
    pub fn calculated_eps(&self) -> Option<f64> {
        if let Some(eps) = self.eps {
            return Some(eps);
        }
        match (self.net_income, self.shares_outstanding) {
            (Some(net_income), Some(shares)) if shares > 0.0 => Some(net_income / shares),
            _ => None,
        }
    }
}

/// Company reference data kept under `metadata/companies.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub ticker: String,
    pub simfin_id: Option<i64>,
    pub company_name: Option<String>,
    pub industry_id: Option<i64>,
}

/// The three partitioned datasets in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Prices,
    Quarterly,
    Annual,
}

impl DataKind {
    pub const ALL: [DataKind; 3] = [DataKind::Prices, DataKind::Quarterly, DataKind::Annual];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Prices => "prices",
            DataKind::Quarterly => "quarterly",
            DataKind::Annual => "annual",
        }
    }

    /// Top-level directory name under the data root
    pub fn dir_name(&self) -> &'static str {
        match self {
            DataKind::Prices => "prices",
            DataKind::Quarterly => "fundamentals_quarterly",
            DataKind::Annual => "fundamentals_annual",
        }
    }
}

impl FromStr for DataKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prices" => Ok(DataKind::Prices),
            "quarterly" => Ok(DataKind::Quarterly),
            "annual" => Ok(DataKind::Annual),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reporting frequency of a statement dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementPeriod {
    Quarterly,
    Annual,
}

impl StatementPeriod {
    pub fn kind(&self) -> DataKind {
        match self {
            StatementPeriod::Quarterly => DataKind::Quarterly,
            StatementPeriod::Annual => DataKind::Annual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl FromStr for StatementPeriod {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarterly" => Ok(StatementPeriod::Quarterly),
            "annual" => Ok(StatementPeriod::Annual),
            other => Err(StoreError::UnknownPeriod(other.to_string())),
        }
    }
}

/// Point in time a ratio is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsOf {
    Latest,
    Date(NaiveDate),
}

impl AsOf {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            AsOf::Latest => None,
            AsOf::Date(date) => Some(*date),
        }
    }
}

impl From<Option<NaiveDate>> for AsOf {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map_or(AsOf::Latest, AsOf::Date)
    }
}

impl fmt::Display for AsOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsOf::Latest => f.write_str("latest"),
            AsOf::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for AsOf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub simfin_data_dir: PathBuf,
    pub default_start_date: NaiveDate,
    pub batch_size: usize,
    pub peg_growth_years: u32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let data_path = PathBuf::from(
            std::env::var("DATA_PATH").unwrap_or_else(|_| "data".to_string()),
        );
        let mut config = Config::with_data_path(&data_path);

        if let Ok(dir) = std::env::var("SIMFIN_DATA_DIR") {
            config.simfin_data_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("DEFAULT_START_DATE") {
            config.default_start_date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("DEFAULT_START_DATE must be YYYY-MM-DD: {}", e))?;
        }
        if let Ok(value) = std::env::var("BATCH_SIZE") {
            config.batch_size = value
                .parse()
                .map_err(|e| anyhow::anyhow!("BATCH_SIZE must be an integer: {}", e))?;
        }
        if let Ok(value) = std::env::var("PEG_GROWTH_YEARS") {
            config.peg_growth_years = value
                .parse()
                .map_err(|e| anyhow::anyhow!("PEG_GROWTH_YEARS must be an integer: {}", e))?;
        }
        if let Ok(value) = std::env::var("LOG_LEVEL") {
            config.log_level = value.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at `data_path`
    pub fn with_data_path(data_path: impl AsRef<Path>) -> Self {
        let data_path = data_path.as_ref().to_path_buf();
        Config {
            simfin_data_dir: data_path.join("simfin"),
            data_path,
            default_start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN),
            batch_size: 50,
            peg_growth_years: 5,
            log_level: "info".to_string(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=500).contains(&self.batch_size) {
            anyhow::bail!("BATCH_SIZE must be between 1 and 500, got {}", self.batch_size);
        }
        if self.peg_growth_years == 0 {
            anyhow::bail!("PEG_GROWTH_YEARS must be at least 1");
        }
        if !matches!(self.log_level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            anyhow::bail!("LOG_LEVEL must be one of trace, debug, info, warn, error; got {}", self.log_level);
        }
        Ok(())
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_path.join(DataKind::Prices.dir_name())
    }

    pub fn fundamentals_quarterly_path(&self) -> PathBuf {
        self.data_path.join(DataKind::Quarterly.dir_name())
    }

    pub fn fundamentals_annual_path(&self) -> PathBuf {
        self.data_path.join(DataKind::Annual.dir_name())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_path.join("metadata")
    }

    /// Base directory for a dataset
    pub fn kind_path(&self, kind: DataKind) -> PathBuf {
        self.data_path.join(kind.dir_name())
    }
}
