//! Ratio calculations against a populated store

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::test_data::{
    create_test_price, create_test_quarter, date, quarters_with_eps, sample_prices, sample_quarterly,
};
use crate::common::{logging, TestEnv};
use rust_yield::analysis::Metric;
use rust_yield::models::{AsOf, StatementPeriod, StatementRow};
use rust_yield::{RatioCalculator, StoreError};

/// AAPL with six January 2024 closes and the four 2023 quarters
fn populated() -> (TestEnv, RatioCalculator) {
    let env = TestEnv::new();
    env.store.write_prices(&sample_prices("AAPL"), "AAPL").unwrap();
    env.store
        .write_statements(&sample_quarterly("AAPL"), "AAPL", StatementPeriod::Quarterly)
        .unwrap();
    let calculator = RatioCalculator::new(env.config.clone());
    (env, calculator)
}

fn write_quarters(env: &TestEnv, ticker: &str, rows: &[StatementRow]) {
    env.store
        .write_statements(rows, ticker, StatementPeriod::Quarterly)
        .unwrap();
}

#[test]
fn test_pe_ratio() {
    let (_env, calculator) = populated();

    // 155.0 / (2.0 + 2.2 + 2.1 + 2.5)
    assert_eq!(calculator.pe_ratio("AAPL", AsOf::Latest).unwrap(), Some(17.61));
}

#[test]
fn test_pe_ratio_as_of_uses_earlier_close() {
    let (_env, calculator) = populated();

    let pe = calculator.pe_ratio("AAPL", AsOf::Date(date(2024, 1, 5))).unwrap();

    // 152.5 / 8.8
    assert_eq!(pe, Some(17.33));
}

#[test]
fn test_pe_ratio_zero_eps_is_null() {
    let env = TestEnv::new();
    env.store.write_prices(&sample_prices("AAPL"), "AAPL").unwrap();
    write_quarters(
        &env,
        "AAPL",
        &quarters_with_eps("AAPL", date(2023, 12, 31), &[1.0, -1.0, 0.5, -0.5]),
    );
    let calculator = RatioCalculator::new(env.config.clone());

    assert_eq!(calculator.pe_ratio("AAPL", AsOf::Latest).unwrap(), None);
    assert_eq!(calculator.peg_ratio("AAPL", 2, AsOf::Latest).unwrap(), None);
}

#[test]
fn test_pe_ratio_without_prices_is_null() {
    let env = TestEnv::new();
    write_quarters(&env, "AAPL", &sample_quarterly("AAPL"));
    let calculator = RatioCalculator::new(env.config.clone());

    assert_eq!(calculator.pe_ratio("AAPL", AsOf::Latest).unwrap(), None);
    assert_eq!(calculator.operating_margin("AAPL", AsOf::Latest).unwrap(), Some(0.2483));
}

#[test]
fn test_pe_ratio_falls_back_to_net_income_over_shares() {
    let env = TestEnv::new();
    env.store.write_prices(&sample_prices("AAPL"), "AAPL").unwrap();
    let quarters: Vec<StatementRow> = sample_quarterly("AAPL")
        .into_iter()
        .map(|mut q| {
            q.eps = None;
            q.net_income = Some(100.0);
            q.shares_outstanding = Some(25.0);
            q
        })
        .collect();
    write_quarters(&env, "AAPL", &quarters);
    let calculator = RatioCalculator::new(env.config.clone());

    // TTM EPS is 400 / 100
    assert_eq!(calculator.pe_ratio("AAPL", AsOf::Latest).unwrap(), Some(38.75));
}

#[test]
fn test_margins() {
    let (_env, calculator) = populated();

    assert_eq!(calculator.operating_margin("AAPL", AsOf::Latest).unwrap(), Some(0.2483));
    assert_eq!(calculator.net_profit_margin("AAPL", AsOf::Latest).unwrap(), Some(0.2023));
    assert_eq!(calculator.gross_margin("AAPL", AsOf::Latest).unwrap(), Some(0.4));
    assert_eq!(calculator.rd_intensity("AAPL", AsOf::Latest).unwrap(), Some(0.0499));
    assert_eq!(calculator.capex_ratio("AAPL", AsOf::Latest).unwrap(), None);
}

#[test]
fn test_capex_ratio_uses_magnitude() {
    let env = TestEnv::new();
    let quarters: Vec<StatementRow> = sample_quarterly("AAPL")
        .into_iter()
        .map(|mut q| {
            q.capex = Some(-4_350.0);
            q
        })
        .collect();
    write_quarters(&env, "AAPL", &quarters);
    let calculator = RatioCalculator::new(env.config.clone());

    assert_eq!(calculator.capex_ratio("AAPL", AsOf::Latest).unwrap(), Some(0.04));
}

#[test]
fn test_zero_revenue_margins_are_null() {
    let env = TestEnv::new();
    let quarters: Vec<StatementRow> = sample_quarterly("AAPL")
        .into_iter()
        .map(|mut q| {
            q.revenue = Some(0.0);
            q
        })
        .collect();
    write_quarters(&env, "AAPL", &quarters);
    let calculator = RatioCalculator::new(env.config.clone());

    assert_eq!(calculator.operating_margin("AAPL", AsOf::Latest).unwrap(), None);
    assert_eq!(calculator.gross_margin("AAPL", AsOf::Latest).unwrap(), None);
}

#[test]
fn test_growth_needs_five_quarters() {
    let (_env, calculator) = populated();

    assert_eq!(calculator.revenue_growth("AAPL", AsOf::Latest).unwrap(), None);
    assert_eq!(calculator.eps_growth("AAPL", AsOf::Latest).unwrap(), None);
    assert_eq!(calculator.peg_ratio("AAPL", 2, AsOf::Latest).unwrap(), None);
}

#[test]
fn test_short_history_warns_on_growth() {
    let (_env, calculator) = populated();

    let (growth, logs) = logging::capture_warnings(|| calculator.revenue_growth("AAPL", AsOf::Latest));

    assert_eq!(growth.unwrap(), None);
    assert!(logs.contains("WARN"));
    assert!(logs.contains("AAPL: 4 quarters, need 5 for year-over-year growth"));
}

#[test]
fn test_year_over_year_growth() {
    let env = TestEnv::new();
    let mut quarters = sample_quarterly("AAPL");
    quarters.insert(0, create_test_quarter("AAPL", date(2022, 12, 31), 100_000.0, 2.0));
    write_quarters(&env, "AAPL", &quarters);
    let calculator = RatioCalculator::new(env.config.clone());

    // Q4 2023 against Q4 2022
    assert_eq!(calculator.revenue_growth("AAPL", AsOf::Latest).unwrap(), Some(0.2));
    assert_eq!(calculator.eps_growth("AAPL", AsOf::Latest).unwrap(), Some(0.25));
}

#[test]
fn test_peg_ratio() {
    logging::init_test_logging();
    let env = TestEnv::configured(|config| config.peg_growth_years = 2);
    env.store
        .write_prices(&[create_test_price("AAPL", date(2024, 1, 31), 100.0)], "AAPL")
        .unwrap();
    write_quarters(
        &env,
        "AAPL",
        &quarters_with_eps("AAPL", date(2023, 12, 31), &[2.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0]),
    );
    let calculator = RatioCalculator::new(env.config.clone());

    assert_eq!(calculator.pe_ratio("AAPL", AsOf::Latest).unwrap(), Some(12.5));
    assert_eq!(calculator.eps_cagr("AAPL", 2, AsOf::Latest).unwrap(), Some(0.4142));
    // 12.5 / 41.42
    assert_eq!(calculator.peg_ratio("AAPL", 2, AsOf::Latest).unwrap(), Some(0.3));
    assert_eq!(calculator.metric("AAPL", Metric::PegRatio, AsOf::Latest).unwrap(), Some(0.3));
    assert_eq!(calculator.peg_ratio("AAPL", 3, AsOf::Latest).unwrap(), None);
}

#[test]
fn test_get_all_ratios() {
    let (_env, calculator) = populated();

    let ratios = calculator.get_all_ratios("AAPL", AsOf::Latest).unwrap();
    logging::log_test_data("ratios", &ratios);

    assert_eq!(ratios.ticker, "AAPL");
    assert_eq!(ratios.as_of_date, AsOf::Latest);
    assert_eq!(ratios.pe_ratio, Some(17.61));
    assert_eq!(ratios.gross_margin, Some(0.4));
    assert_eq!(ratios.revenue_growth, None);
    assert!(ratios.metric_errors.is_empty());

    let json = serde_json::to_value(&ratios).unwrap();
    assert_eq!(json["as_of_date"], "latest");
    assert_eq!(json["pe_ratio"], 17.61);
    assert!(json["peg_ratio"].is_null());
    assert!(json.get("metric_errors").is_none());
}

#[test]
fn test_get_all_ratios_rejects_invalid_ticker() {
    let (_env, calculator) = populated();

    assert_matches!(
        calculator.get_all_ratios("../AAPL", AsOf::Latest),
        Err(StoreError::InvalidTicker(_))
    );
}

#[test]
fn test_unreadable_statements_are_recorded_per_metric() {
    let (env, calculator) = populated();
    let file = env
        .config
        .fundamentals_quarterly_path()
        .join("ticker=AAPL")
        .join("data.csv");
    std::fs::write(&file, "ticker,quarter\nAAPL,not-a-date\n").unwrap();

    let ratios = calculator.get_all_ratios("AAPL", AsOf::Latest).unwrap();

    assert_eq!(ratios.metric_errors.len(), Metric::ALL.len());
    assert!(ratios.metric_errors.contains_key("pe_ratio"));
    assert!(ratios.metric_errors["gross_margin"].contains("CSV error"));
    assert_eq!(ratios.pe_ratio, None);
}
