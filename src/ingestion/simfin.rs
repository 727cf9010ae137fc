//! SimFin bulk CSV downloads as a [`DataSource`].
//!
//! The bulk files are semicolon-delimited with SimFin's own column names;
//! records are read with serde renames and normalized to the store schema.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ingestion::source::DataSource;
use crate::models::{CompanyInfo, Config, PriceRow, StatementPeriod, StatementRow};

pub(crate) const PRICES_FILE: &str = "us-shareprices-daily.csv";
pub(crate) const COMPANIES_FILE: &str = "us-companies.csv";

#[derive(Debug, Deserialize)]
struct SimFinDailyPrice {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open", default)]
    open: Option<String>,
    #[serde(rename = "High", default)]
    high: Option<String>,
    #[serde(rename = "Low", default)]
    low: Option<String>,
    #[serde(rename = "Close", default)]
    close: Option<String>,
    #[serde(rename = "Adj. Close", default)]
    adj_close: Option<String>,
    #[serde(rename = "Volume", default)]
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimFinIncome {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Fiscal Year")]
    fiscal_year: i32,
    #[serde(rename = "Fiscal Period")]
    fiscal_period: String,
    #[serde(rename = "Report Date")]
    report_date: String,
    #[serde(rename = "Revenue", default)]
    revenue: Option<String>,
    #[serde(rename = "Gross Profit", default)]
    gross_profit: Option<String>,
    #[serde(rename = "Operating Income (Loss)", default)]
    operating_income: Option<String>,
    #[serde(rename = "Net Income", default)]
    net_income: Option<String>,
    #[serde(rename = "Earnings Per Share, Diluted", default)]
    eps_diluted: Option<String>,
    #[serde(rename = "Research & Development", default)]
    research_development: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimFinBalance {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Fiscal Year")]
    fiscal_year: i32,
    #[serde(rename = "Fiscal Period")]
    fiscal_period: String,
    #[serde(rename = "Shares (Diluted)", default)]
    shares_diluted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimFinCashflow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Fiscal Year")]
    fiscal_year: i32,
    #[serde(rename = "Fiscal Period")]
    fiscal_period: String,
    #[serde(rename = "Net Cash from Operating Activities", default)]
    operating_cash_flow: Option<String>,
    #[serde(rename = "Change in Fixed Assets & Intangibles", default)]
    capex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimFinCompany {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "SimFinId", default)]
    simfin_id: Option<String>,
    #[serde(rename = "Company Name", default)]
    company_name: Option<String>,
    #[serde(rename = "IndustryId", default)]
    industry_id: Option<String>,
}

/// Parse optional string field to f64
fn parse_optional_f64(value: &Option<String>) -> Option<f64> {
    value.as_ref().and_then(|s| {
        if s.trim().is_empty() {
            None
        } else {
            s.trim().parse().ok()
        }
    })
}

/// Parse optional string field to i64
fn parse_optional_i64(value: &Option<String>) -> Option<i64> {
    value.as_ref().and_then(|s| {
        if s.trim().is_empty() {
            None
        } else {
            s.trim().parse().ok()
        }
    })
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Deserialize every record, skipping rows that do not parse
fn read_records<T: DeserializeOwned>(reader: impl Read, label: &str) -> Vec<T> {
    let mut rdr = ReaderBuilder::new().delimiter(b';').from_reader(reader);

    let mut records = Vec::new();
    let mut skipped = 0;
    for (row_num, result) in rdr.deserialize().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                if skipped <= 10 {
                    warn!("Skipping {} row {}: {}", label, row_num + 1, e);
                }
            }
        }
    }
    if skipped > 0 {
        warn!("Skipped {} unparseable rows in {}", skipped, label);
    }
    records
}

fn normalize_price(record: SimFinDailyPrice) -> Option<PriceRow> {
    let ticker = record.ticker.trim();
    if ticker.is_empty() {
        return None;
    }
    let close = parse_optional_f64(&record.close)?;

    Some(PriceRow {
        ticker: ticker.to_string(),
        date: parse_date(&record.date)?,
        open: parse_optional_f64(&record.open)?,
        high: parse_optional_f64(&record.high)?,
        low: parse_optional_f64(&record.low)?,
        close,
        adjusted_close: parse_optional_f64(&record.adj_close).unwrap_or(close),
        volume: parse_optional_i64(&record.volume).unwrap_or(0),
    })
}

fn normalize_company(record: SimFinCompany) -> Option<CompanyInfo> {
    let ticker = record.ticker.trim();
    if ticker.is_empty() {
        return None;
    }
    Some(CompanyInfo {
        ticker: ticker.to_string(),
        simfin_id: parse_optional_i64(&record.simfin_id),
        company_name: record.company_name.filter(|n| !n.trim().is_empty()),
        industry_id: parse_optional_i64(&record.industry_id),
    })
}

type PeriodKey = (String, i32, String);

/// Left-join balance and cash-flow rows onto income rows by
/// (ticker, fiscal year, fiscal period label)
fn join_statements(
    income: Vec<SimFinIncome>,
    balance: Vec<SimFinBalance>,
    cashflow: Vec<SimFinCashflow>,
) -> Vec<StatementRow> {
    let balance: HashMap<PeriodKey, SimFinBalance> = balance
        .into_iter()
        .map(|b| ((b.ticker.clone(), b.fiscal_year, b.fiscal_period.clone()), b))
        .collect();
    let cashflow: HashMap<PeriodKey, SimFinCashflow> = cashflow
        .into_iter()
        .map(|c| ((c.ticker.clone(), c.fiscal_year, c.fiscal_period.clone()), c))
        .collect();

    let mut rows = Vec::with_capacity(income.len());
    for record in income {
        let ticker = record.ticker.trim();
        let Some(period_end) = parse_date(&record.report_date) else {
            warn!(
                "Skipping {} {} {}: invalid report date '{}'",
                record.ticker, record.fiscal_year, record.fiscal_period, record.report_date
            );
            continue;
        };
        if ticker.is_empty() {
            continue;
        }

        let mut row = StatementRow::new(ticker, record.fiscal_year, period_end);
        row.revenue = parse_optional_f64(&record.revenue);
        row.gross_profit = parse_optional_f64(&record.gross_profit);
        row.operating_income = parse_optional_f64(&record.operating_income);
        row.net_income = parse_optional_f64(&record.net_income);
        row.eps = parse_optional_f64(&record.eps_diluted);
        row.rd_expense = parse_optional_f64(&record.research_development);

        let key = (record.ticker.clone(), record.fiscal_year, record.fiscal_period.clone());
        if let Some(b) = balance.get(&key) {
            row.shares_outstanding = parse_optional_f64(&b.shares_diluted);
        }
        if let Some(c) = cashflow.get(&key) {
            row.operating_cash_flow = parse_optional_f64(&c.operating_cash_flow);
            row.capex = parse_optional_f64(&c.capex);
        }
        row.free_cash_flow = match (row.operating_cash_flow, row.capex) {
            (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
            _ => None,
        };

        rows.push(row);
    }
    rows
}

/// SimFin bulk download directory
#[derive(Debug, Clone)]
pub struct SimFinBulkSource {
    dir: PathBuf,
}

impl SimFinBulkSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.simfin_data_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records of one bulk file; a missing file yields no records
    fn load<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            warn!("SimFin file not found: {}", path.display());
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&path)
            .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
        let records = read_records(file, file_name);
        info!("📄 Loaded {} records from {}", records.len(), file_name);
        Ok(records)
    }
}

pub(crate) fn statement_file(kind: &str, period: StatementPeriod) -> String {
    format!("us-{}-{}.csv", kind, period.as_str())
}

impl DataSource for SimFinBulkSource {
    fn price_rows(&self) -> Result<Vec<PriceRow>> {
        let records: Vec<SimFinDailyPrice> = self.load(PRICES_FILE)?;
        let total = records.len();
        let rows: Vec<PriceRow> = records.into_iter().filter_map(normalize_price).collect();
        if rows.len() < total {
            warn!("Dropped {} price rows with missing ticker, date or OHLC values", total - rows.len());
        }
        Ok(rows)
    }

    fn statement_rows(&self, period: StatementPeriod) -> Result<Vec<StatementRow>> {
        let income: Vec<SimFinIncome> = self.load(&statement_file("income", period))?;
        if income.is_empty() {
            return Ok(Vec::new());
        }
        let balance: Vec<SimFinBalance> = self.load(&statement_file("balance", period))?;
        let cashflow: Vec<SimFinCashflow> = self.load(&statement_file("cashflow", period))?;

        Ok(join_statements(income, balance, cashflow))
    }

    fn companies(&self) -> Result<Vec<CompanyInfo>> {
        let records: Vec<SimFinCompany> = self.load(COMPANIES_FILE)?;
        Ok(records.into_iter().filter_map(normalize_company).collect())
    }
}
