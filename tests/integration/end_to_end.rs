//! SimFin bulk files through ingestion, storage and ratio analysis

use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use test_log::test;

use crate::common::test_data::date;
use crate::common::{logging, TestEnv};
use rust_yield::analysis::{Metric, MetricFilter};
use rust_yield::ingestion::{DataIngestion, SimFinBulkSource, COMPANIES_METADATA};
use rust_yield::models::{AsOf, CompanyInfo, DataKind};
use rust_yield::MetricsEngine;

const PRICES: &str = "\
Ticker;SimFinId;Date;Open;High;Low;Close;Adj. Close;Volume;Dividend;Shares Outstanding
AAPL;111052;2019-12-31;72.48;73.42;72.38;73.41;71.92;100805600;;
AAPL;111052;2024-01-02;150.0;152.0;149.0;151.0;150.5;1000000;;
AAPL;111052;2024-01-03;151.0;153.0;150.0;152.0;151.5;1000000;;
AAPL;111052;2024-01-04;151.0;152.5;150.5;151.5;151.0;1000000;;
AAPL;111052;2024-01-05;152.0;153.0;151.0;152.5;152.0;1000000;;
AAPL;111052;2024-01-08;153.0;155.0;152.0;154.0;153.5;1000000;;
AAPL;111052;2024-01-09;154.0;156.0;153.0;155.0;154.5;1000000;;
MSFT;59265;2024-01-08;370.0;375.0;369.0;374.0;373.0;2000000;;
MSFT;59265;2024-01-09;374.0;376.0;372.0;375.0;374.0;2000000;;
";

const INCOME: &str = "\
Ticker;SimFinId;Currency;Fiscal Year;Fiscal Period;Report Date;Revenue;Gross Profit;Operating Income (Loss);Net Income;Earnings Per Share, Diluted;Research & Development
AAPL;111052;USD;2023;Q1;2023-03-31;100000;40000;25000;20000;2.0;-5000
AAPL;111052;USD;2023;Q2;2023-06-30;110000;44000;27000;22000;2.2;-5500
AAPL;111052;USD;2023;Q3;2023-09-30;105000;42000;26000;21000;2.1;-5200
AAPL;111052;USD;2023;Q4;2023-12-31;120000;48000;30000;25000;2.5;-6000
";

const BALANCE: &str = "\
Ticker;SimFinId;Fiscal Year;Fiscal Period;Shares (Diluted)
AAPL;111052;2023;Q1;10000
AAPL;111052;2023;Q4;10000
";

const CASHFLOW: &str = "\
Ticker;SimFinId;Fiscal Year;Fiscal Period;Net Cash from Operating Activities;Change in Fixed Assets & Intangibles
AAPL;111052;2023;Q1;30000;-4350
AAPL;111052;2023;Q2;30000;-4350
AAPL;111052;2023;Q3;30000;-4350
AAPL;111052;2023;Q4;30000;-4350
";

const COMPANIES: &str = "\
Ticker;SimFinId;Company Name;IndustryId
AAPL;111052;APPLE INC;101001
MSFT;59265;MICROSOFT CORP;101003
";

fn write_bulk_files(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("us-shareprices-daily.csv"), PRICES).unwrap();
    fs::write(dir.join("us-income-quarterly.csv"), INCOME).unwrap();
    fs::write(dir.join("us-balance-quarterly.csv"), BALANCE).unwrap();
    fs::write(dir.join("us-cashflow-quarterly.csv"), CASHFLOW).unwrap();
    fs::write(dir.join("us-companies.csv"), COMPANIES).unwrap();
}

#[test]
fn test_simfin_bulk_files_to_ratios() {
    logging::init_test_logging();
    let env = TestEnv::new();
    write_bulk_files(&env.config.simfin_data_dir);

    logging::log_test_step("ingest SimFin bulk directory");
    let source = SimFinBulkSource::from_config(&env.config);
    let ingestion = DataIngestion::new(env.config.clone(), source).unwrap();
    let summary = ingestion.update_all_data(None, None, true).unwrap();
    logging::log_test_data("ingestion summary", &summary);

    // 2019 row is before the default start date
    assert_eq!(summary.tickers_processed, 2);
    assert_eq!(summary.prices_written, 8);
    assert_eq!(summary.fundamentals_written, 4);
    assert!(summary.errors.is_empty());
    assert!(!env.config.prices_path().join("ticker=AAPL").join("year=2019").exists());

    let companies: Vec<CompanyInfo> = ingestion.store().read_metadata(COMPANIES_METADATA).unwrap();
    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0].company_name.as_deref(), Some("APPLE INC"));

    let quarters = env.reader.quarterly().ticker("AAPL").rows().unwrap();
    assert_eq!(quarters[0].shares_outstanding, Some(10_000.0));
    assert_eq!(quarters[1].shares_outstanding, None);
    assert_eq!(quarters[3].free_cash_flow, Some(25_650.0));

    logging::log_test_step("calculate ratios");
    let engine = MetricsEngine::new(env.config.clone());
    let ratios = engine.calculator().get_all_ratios("AAPL", AsOf::Latest).unwrap();

    assert_eq!(ratios.pe_ratio, Some(17.61));
    assert_eq!(ratios.operating_margin, Some(0.2483));
    assert_eq!(ratios.net_profit_margin, Some(0.2023));
    assert_eq!(ratios.gross_margin, Some(0.4));
    assert_eq!(ratios.rd_intensity, Some(0.0499));
    assert_eq!(ratios.capex_ratio, Some(0.04));
    assert_eq!(ratios.revenue_growth, None);
    assert_eq!(ratios.peg_ratio, None);
    assert!(ratios.metric_errors.is_empty());

    let rows = engine.calculate_all(None, AsOf::Latest).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].ticker(), "MSFT");
    assert_eq!(rows[1].value(Metric::PeRatio), None);

    let screened = engine
        .screen(&[MetricFilter::new("gross_margin", Some(0.3), None)], None)
        .unwrap();
    assert_eq!(screened.len(), 1);
    assert_eq!(screened[0].ticker(), "AAPL");
}

#[test]
fn test_incremental_update_from_refreshed_bulk_file() {
    let env = TestEnv::new();
    let dir = env.config.simfin_data_dir.clone();
    write_bulk_files(&dir);

    let ingestion =
        DataIngestion::new(env.config.clone(), SimFinBulkSource::from_config(&env.config)).unwrap();
    ingestion.update_all_data(None, None, false).unwrap();
    assert!(!env.reader.has_data("AAPL", DataKind::Quarterly).unwrap());

    let refreshed = format!(
        "{}AAPL;111052;2024-01-10;155.0;158.0;154.0;157.5;157.0;1200000;;\n",
        PRICES
    );
    fs::write(dir.join("us-shareprices-daily.csv"), refreshed).unwrap();

    let summary = ingestion.update_prices_incremental(None).unwrap();
    assert_eq!(summary.tickers_updated, 1);
    assert_eq!(summary.new_records, 1);

    let latest = env.reader.latest_price("AAPL").unwrap().unwrap();
    assert_eq!(latest.date, date(2024, 1, 10));
    assert_eq!(latest.close, 157.5);
}

#[test]
fn test_validate_bulk_directory() {
    let env = TestEnv::new();
    write_bulk_files(&env.config.simfin_data_dir);

    let report = SimFinBulkSource::from_config(&env.config).validate().unwrap();
    logging::log_test_data("validation report", &report);

    let passed: Vec<(&str, bool)> = report.results.iter().map(|r| (r.name.as_str(), r.passed)).collect();
    assert_eq!(
        passed,
        vec![
            ("Bulk Files", true),
            ("S&P 500 Coverage", false),
            ("Price Data", true),
            ("Fundamentals Data", true),
            ("Data Completeness", false),
            ("R&D and CapEx Data", true),
        ]
    );
    assert!(!report.all_passed);
    assert_eq!(report.sp500_coverage, 2);
    assert!(report.price_data_available);
    assert!(report.fundamentals_available);

    let files = &report.result("Bulk Files").unwrap().details;
    assert_eq!(files["us-income-quarterly.csv"], true);
    assert_eq!(files["us-income-annual.csv"], false);

    let prices = &report.result("Price Data").unwrap().details;
    assert_eq!(prices["total_rows"], 9);
    assert_eq!(prices["aapl_rows"], 7);
    assert_eq!(prices["min_date"], "2019-12-31");
    assert_eq!(prices["max_date"], "2024-01-09");

    let completeness = &report.result("Data Completeness").unwrap().details;
    assert_eq!(completeness["AAPL"]["price_rows"], 7);
    assert_eq!(completeness["AAPL"]["income_rows"], 4);
    assert_eq!(completeness["MSFT"]["income_rows"], 0);

    let columns = &report.result("R&D and CapEx Data").unwrap().details;
    assert_eq!(columns["rd_columns"][0], "Research & Development");
    assert_eq!(columns["capex_columns"][0], "Change in Fixed Assets & Intangibles");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["all_passed"], false);
    assert_eq!(json["results"].as_array().unwrap().len(), 6);
}

#[test]
fn test_validate_empty_directory_fails_every_check() {
    let env = TestEnv::new();

    let report = SimFinBulkSource::from_config(&env.config).validate().unwrap();

    assert!(report.results.iter().all(|r| !r.passed));
    assert_eq!(report.sp500_coverage, 0);
    assert_eq!(
        report.result("Price Data").unwrap().message,
        "us-shareprices-daily.csv not found"
    );
    assert_eq!(report.failed().count(), 6);
}
