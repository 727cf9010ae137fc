//! Trailing-twelve-month aggregation over stored quarters

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::test_data::{create_test_quarter, date, sample_quarterly};
use crate::common::{logging, TestEnv};
use rust_yield::models::{AsOf, StatementPeriod};
use rust_yield::TtmAggregator;

fn aggregator(env: &TestEnv) -> TtmAggregator {
    TtmAggregator::new(env.reader.clone())
}

#[test]
fn test_ttm_sums_four_quarters() {
    logging::init_test_logging();
    let env = TestEnv::new();
    env.store
        .write_statements(&sample_quarterly("AAPL"), "AAPL", StatementPeriod::Quarterly)
        .unwrap();

    let ttm = aggregator(&env).snapshot("AAPL", AsOf::Latest).unwrap();
    logging::log_test_data("ttm", &ttm);

    assert_eq!(ttm.quarters_included, 4);
    assert_eq!(ttm.latest_period, Some(date(2023, 12, 31)));
    assert_eq!(ttm.revenue, Some(435_000.0));
    assert_eq!(ttm.gross_profit, Some(174_000.0));
    assert_eq!(ttm.operating_income, Some(108_000.0));
    assert_eq!(ttm.net_income, Some(88_000.0));
    assert_eq!(ttm.rd_expense, Some(21_700.0));
    assert_eq!(ttm.capex, None);
    assert!((ttm.eps.unwrap() - 8.8).abs() < 1e-9);
}

#[test]
fn test_ttm_skips_null_values() {
    let env = TestEnv::new();
    let mut quarters = sample_quarterly("AAPL");
    quarters[1].revenue = None;
    env.store
        .write_statements(&quarters, "AAPL", StatementPeriod::Quarterly)
        .unwrap();

    let ttm = aggregator(&env).snapshot("AAPL", AsOf::Latest).unwrap();

    assert_eq!(ttm.quarters_included, 4);
    assert_eq!(ttm.revenue, Some(325_000.0));
}

#[test]
fn test_ttm_as_of_uses_fewer_quarters() {
    let env = TestEnv::new();
    env.store
        .write_statements(&sample_quarterly("AAPL"), "AAPL", StatementPeriod::Quarterly)
        .unwrap();

    let ttm = aggregator(&env)
        .snapshot("AAPL", AsOf::Date(date(2023, 10, 15)))
        .unwrap();

    assert_eq!(ttm.quarters_included, 3);
    assert_eq!(ttm.latest_period, Some(date(2023, 9, 30)));
    assert_eq!(ttm.revenue, Some(315_000.0));
}

#[test]
fn test_ttm_uses_only_latest_four_quarters() {
    let env = TestEnv::new();
    let mut quarters = sample_quarterly("AAPL");
    quarters.insert(0, create_test_quarter("AAPL", date(2022, 12, 31), 999_999.0, 9.0));
    env.store
        .write_statements(&quarters, "AAPL", StatementPeriod::Quarterly)
        .unwrap();

    let aggregator = aggregator(&env);
    let ttm = aggregator.snapshot("AAPL", AsOf::Latest).unwrap();
    assert_eq!(ttm.quarters_included, 4);
    assert_eq!(ttm.revenue, Some(435_000.0));

    let history = aggregator.quarters("AAPL", AsOf::Latest).unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].fiscal_period, date(2023, 12, 31));
    assert_eq!(history[4].fiscal_period, date(2022, 12, 31));
}

#[test]
fn test_ttm_without_quarters_is_empty() {
    let env = TestEnv::new();

    let ttm = aggregator(&env).snapshot("AAPL", AsOf::Latest).unwrap();

    assert!(ttm.is_empty());
    assert_eq!(ttm.latest_period, None);
    assert_eq!(ttm.revenue, None);
    assert_eq!(ttm.ttm_eps(), None);
}

#[test]
fn test_ttm_all_null_field_stays_null() {
    let env = TestEnv::new();
    let mut quarters = sample_quarterly("AAPL");
    for quarter in &mut quarters {
        quarter.operating_income = None;
    }
    env.store
        .write_statements(&quarters, "AAPL", StatementPeriod::Quarterly)
        .unwrap();

    let ttm = aggregator(&env).snapshot("AAPL", AsOf::Latest).unwrap();

    assert_eq!(ttm.operating_income, None);
    assert_eq!(ttm.revenue, Some(435_000.0));
}
