//! Readiness checks over a SimFin bulk directory before a load.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ingestion::simfin::{parse_date, statement_file, COMPANIES_FILE, PRICES_FILE};
use crate::ingestion::{sp500_universe, SimFinBulkSource};
use crate::models::StatementPeriod;

/// Large caps every usable bulk download should carry
pub const SAMPLE_TICKERS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

const MIN_SAMPLE_COVERAGE: usize = 4;
const MIN_COMPLETE_SAMPLES: usize = 3;
const MIN_KEY_COLUMNS: usize = 2;
const KEY_INCOME_COLUMNS: [&str; 4] =
    ["Revenue", "Net Income", "Gross Profit", "Operating Income (Loss)"];

/// Outcome of one named check
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Value,
}

impl ValidationResult {
    fn new(name: &str, passed: bool, message: String, details: Value) -> Self {
        Self { name: name.to_string(), passed, message, details }
    }

    fn missing(name: &str, file: &str) -> Self {
        Self::new(name, false, format!("{} not found", file), json!({ "file": file }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub data_dir: PathBuf,
    pub all_passed: bool,
    /// S&P 500 tickers loadable from the price file
    pub sp500_coverage: usize,
    pub price_data_available: bool,
    pub fundamentals_available: bool,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn result(&self, name: &str) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Header names and per-ticker row counts of one bulk file
struct FileScan {
    headers: Vec<String>,
    rows: usize,
    ticker_rows: HashMap<String, usize>,
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
}

impl FileScan {
    fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    fn columns_matching(&self, needles: &[&str]) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| {
                let lower = h.to_lowercase();
                needles.iter().any(|n| lower.contains(n))
            })
            .cloned()
            .collect()
    }

    fn rows_for(&self, ticker: &str) -> usize {
        self.ticker_rows.get(ticker).copied().unwrap_or(0)
    }

    fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.ticker_rows.keys().cloned().collect();
        tickers.sort();
        tickers
    }
}

fn header_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Count rows per ticker; `None` when the file is absent
fn scan_file(path: &Path) -> Result<Option<FileScan>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
    let headers = rdr.headers()?.clone();
    let ticker_idx = header_index(&headers, "Ticker");
    let date_idx = header_index(&headers, "Date");

    let mut scan = FileScan {
        headers: headers.iter().map(|h| h.trim().to_string()).collect(),
        rows: 0,
        ticker_rows: HashMap::new(),
        min_date: None,
        max_date: None,
    };
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row in {}: {}", path.display(), e);
                continue;
            }
        };
        scan.rows += 1;
        if let Some(ticker) = ticker_idx.and_then(|i| record.get(i)) {
            *scan.ticker_rows.entry(ticker.trim().to_string()).or_insert(0) += 1;
        }
        if let Some(d) = date_idx.and_then(|i| record.get(i)).and_then(parse_date) {
            scan.min_date = Some(scan.min_date.map_or(d, |m| m.min(d)));
            scan.max_date = Some(scan.max_date.map_or(d, |m| m.max(d)));
        }
    }
    Ok(Some(scan))
}

fn check_files(dir: &Path) -> ValidationResult {
    let mut files = Map::new();
    let mut names = vec![PRICES_FILE.to_string(), COMPANIES_FILE.to_string()];
    for kind in ["income", "balance", "cashflow"] {
        names.push(statement_file(kind, StatementPeriod::Quarterly));
        names.push(statement_file(kind, StatementPeriod::Annual));
    }
    for name in &names {
        files.insert(name.clone(), Value::Bool(dir.join(name).exists()));
    }
    let present = files.values().filter(|v| v.as_bool() == Some(true)).count();
    let income = statement_file("income", StatementPeriod::Quarterly);
    let passed = dir.join(PRICES_FILE).exists() && dir.join(&income).exists();
    let message = if passed {
        format!("{}/{} bulk files present", present, names.len())
    } else {
        format!("{} and {} are required", PRICES_FILE, income)
    };
    ValidationResult::new("Bulk Files", passed, message, Value::Object(files))
}

fn check_coverage(companies: Option<&FileScan>) -> ValidationResult {
    let Some(companies) = companies else {
        return ValidationResult::missing("S&P 500 Coverage", COMPANIES_FILE);
    };
    let (found, missing): (Vec<&str>, Vec<&str>) =
        SAMPLE_TICKERS.into_iter().partition(|t| companies.rows_for(t) > 0);
    let passed = found.len() >= MIN_SAMPLE_COVERAGE;
    ValidationResult::new(
        "S&P 500 Coverage",
        passed,
        format!("Found {}/{} sample tickers", found.len(), SAMPLE_TICKERS.len()),
        json!({
            "total_companies": companies.rows,
            "found": found,
            "missing": missing,
        }),
    )
}

fn check_prices(prices: Option<&FileScan>) -> ValidationResult {
    let Some(prices) = prices else {
        return ValidationResult::missing("Price Data", PRICES_FILE);
    };
    let history_start = NaiveDate::from_ymd_opt(2020, 6, 1);
    let passed = prices.rows > 0 && prices.min_date.is_some() && prices.min_date <= history_start;
    let message = match (prices.min_date, prices.max_date) {
        (Some(min), Some(max)) => format!("Price data from {} to {}", min, max),
        _ => "No dated price rows".to_string(),
    };
    ValidationResult::new(
        "Price Data",
        passed,
        message,
        json!({
            "total_rows": prices.rows,
            "unique_tickers": prices.ticker_rows.len(),
            "min_date": prices.min_date,
            "max_date": prices.max_date,
            "aapl_rows": prices.rows_for("AAPL"),
        }),
    )
}

fn check_fundamentals(income: Option<&FileScan>) -> ValidationResult {
    let file = statement_file("income", StatementPeriod::Quarterly);
    let Some(income) = income else {
        return ValidationResult::missing("Fundamentals Data", &file);
    };
    let found: Vec<&str> = KEY_INCOME_COLUMNS
        .iter()
        .copied()
        .filter(|c| income.has_column(c))
        .collect();
    let passed = found.len() >= MIN_KEY_COLUMNS;
    ValidationResult::new(
        "Fundamentals Data",
        passed,
        format!("Found {}/{} key income columns", found.len(), KEY_INCOME_COLUMNS.len()),
        json!({
            "total_rows": income.rows,
            "unique_tickers": income.ticker_rows.len(),
            "key_columns_found": found,
            "aapl_quarters": income.rows_for("AAPL"),
        }),
    )
}

fn check_completeness(prices: Option<&FileScan>, income: Option<&FileScan>) -> ValidationResult {
    let mut per_ticker = Map::new();
    let mut complete = 0;
    for ticker in SAMPLE_TICKERS {
        let price_rows = prices.map_or(0, |p| p.rows_for(ticker));
        let income_rows = income.map_or(0, |i| i.rows_for(ticker));
        if price_rows > 0 && income_rows > 0 {
            complete += 1;
        }
        per_ticker.insert(
            ticker.to_string(),
            json!({ "price_rows": price_rows, "income_rows": income_rows }),
        );
    }
    ValidationResult::new(
        "Data Completeness",
        complete >= MIN_COMPLETE_SAMPLES,
        format!("{}/{} sample tickers have prices and income statements", complete, SAMPLE_TICKERS.len()),
        Value::Object(per_ticker),
    )
}

fn check_rd_capex(income: Option<&FileScan>, cashflow: Option<&FileScan>) -> ValidationResult {
    let rd_columns = income.map(|i| i.columns_matching(&["r&d", "research"])).unwrap_or_default();
    let capex_columns = cashflow
        .map(|c| c.columns_matching(&["fixed assets", "capex"]))
        .unwrap_or_default();
    let capex_available = !capex_columns.is_empty();
    let rd_available = !rd_columns.is_empty();
    ValidationResult::new(
        "R&D and CapEx Data",
        capex_available,
        format!("R&D: {}, CapEx: {}", rd_available, capex_available),
        json!({
            "rd_available": rd_available,
            "rd_columns": rd_columns,
            "capex_available": capex_available,
            "capex_columns": capex_columns,
        }),
    )
}

impl SimFinBulkSource {
    /// Check the bulk directory holds enough data for ratio analysis
    pub fn validate(&self) -> Result<ValidationReport> {
        let dir = self.dir();
        info!("🔍 Validating SimFin bulk files in {}", dir.display());

        let prices = scan_file(&dir.join(PRICES_FILE))?;
        let companies = scan_file(&dir.join(COMPANIES_FILE))?;
        let income = scan_file(&dir.join(statement_file("income", StatementPeriod::Quarterly)))?;
        let cashflow = scan_file(&dir.join(statement_file("cashflow", StatementPeriod::Quarterly)))?;

        let results = vec![
            check_files(dir),
            check_coverage(companies.as_ref()),
            check_prices(prices.as_ref()),
            check_fundamentals(income.as_ref()),
            check_completeness(prices.as_ref(), income.as_ref()),
            check_rd_capex(income.as_ref(), cashflow.as_ref()),
        ];

        let passed = |name: &str| results.iter().any(|r| r.name == name && r.passed);
        let report = ValidationReport {
            data_dir: dir.to_path_buf(),
            all_passed: results.iter().all(|r| r.passed),
            sp500_coverage: prices.as_ref().map_or(0, |p| sp500_universe(&p.tickers()).len()),
            price_data_available: passed("Price Data"),
            fundamentals_available: passed("Fundamentals Data"),
            results,
        };

        for result in &report.results {
            if result.passed {
                info!("✅ {}: {}", result.name, result.message);
            } else {
                warn!("❌ {}: {}", result.name, result.message);
            }
        }
        Ok(report)
    }
}
