use anyhow::Result;

use crate::models::{CompanyInfo, PriceRow, StatementPeriod, StatementRow};

/// Upstream provider of raw market and statement data.
///
/// Implementations return rows already normalized to the store schema, for
/// every ticker the provider knows about.
pub trait DataSource {
    fn price_rows(&self) -> Result<Vec<PriceRow>>;

    /// Joined income, balance and cash-flow rows for one reporting frequency
    fn statement_rows(&self, period: StatementPeriod) -> Result<Vec<StatementRow>>;

    fn companies(&self) -> Result<Vec<CompanyInfo>>;

    /// Sorted, distinct tickers that have price data
    fn available_tickers(&self) -> Result<Vec<String>> {
        let mut tickers: Vec<String> = self.price_rows()?.into_iter().map(|r| r.ticker).collect();
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }
}
