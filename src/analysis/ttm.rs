use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::models::{AsOf, StatementRow};
use crate::query::DataReader;

/// Quarters summed into one trailing-twelve-month figure
pub const TTM_QUARTERS: usize = 4;

/// Trailing-twelve-month sums over the most recent quarterly statements.
///
/// `quarters_included` below 4 marks a degraded snapshot; fields are never
/// padded with zeros for the missing quarters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtmSnapshot {
    pub ticker: String,
    pub quarters_included: usize,
    pub latest_period: Option<NaiveDate>,
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

impl TtmSnapshot {
    /// Sum `quarters` field by field; nulls are skipped, all-null stays null
    pub fn from_quarters(ticker: &str, quarters: &[StatementRow]) -> Self {
        let sum = |field: fn(&StatementRow) -> Option<f64>| sum_present(quarters.iter().map(field));

        Self {
            ticker: ticker.to_string(),
            quarters_included: quarters.len(),
            latest_period: quarters.iter().map(|q| q.fiscal_period).max(),
            revenue: sum(|q| q.revenue),
            gross_profit: sum(|q| q.gross_profit),
            operating_income: sum(|q| q.operating_income),
            net_income: sum(|q| q.net_income),
            eps: sum(|q| q.eps),
            shares_outstanding: sum(|q| q.shares_outstanding),
            rd_expense: sum(|q| q.rd_expense),
            capex: sum(|q| q.capex),
            operating_cash_flow: sum(|q| q.operating_cash_flow),
            free_cash_flow: sum(|q| q.free_cash_flow),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quarters_included == 0
    }

    /// TTM EPS: summed reported EPS, else net income over shares outstanding
    pub fn ttm_eps(&self) -> Option<f64> {
        if let Some(eps) = self.eps {
            return Some(eps);
        }
        match (self.net_income, self.shares_outstanding) {
            (Some(net_income), Some(shares)) if shares > 0.0 => Some(net_income / shares),
            _ => None,
        }
    }
}

/// Sum of the present values, or `None` when every value is missing
pub fn sum_present(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Builds TTM snapshots and quarter histories from the quarterly dataset
#[derive(Debug, Clone)]
pub struct TtmAggregator {
    reader: DataReader,
}

impl TtmAggregator {
    pub fn new(reader: DataReader) -> Self {
        Self { reader }
    }

    /// Quarterly statements with `fiscal_period <= as_of`, newest first
    pub fn quarters(&self, ticker: &str, as_of: AsOf) -> StoreResult<Vec<StatementRow>> {
        let mut scan = self.reader.quarterly().ticker(ticker);
        if let Some(date) = as_of.date() {
            scan = scan.until(date);
        }
        let mut rows = scan.rows()?;
        rows.reverse();
        Ok(rows)
    }

    /// TTM snapshot from the (at most) four most recent quarters as of `as_of`
    pub fn snapshot(&self, ticker: &str, as_of: AsOf) -> StoreResult<TtmSnapshot> {
        let mut quarters = self.quarters(ticker, as_of)?;
        quarters.truncate(TTM_QUARTERS);

        if quarters.is_empty() {
            debug!("{}: no quarterly data as of {}", ticker, as_of);
        } else if quarters.len() < TTM_QUARTERS {
            warn!(
                "{}: only {} quarters available for TTM calculation",
                ticker,
                quarters.len()
            );
        }

        Ok(TtmSnapshot::from_quarters(ticker, &quarters))
    }
}
