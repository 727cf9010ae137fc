use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::analysis::ttm::{sum_present, TtmAggregator, TtmSnapshot, TTM_QUARTERS};
use crate::error::{StoreError, StoreResult};
use crate::models::{AsOf, Config, StatementRow};
use crate::query::DataReader;
use crate::storage::partition::validate_ticker;

/// Quarters between a quarter and the same quarter one year earlier
const YEAR_AGO_OFFSET: usize = 4;

/// Every ratio the calculator produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    PeRatio,
    PegRatio,
    OperatingMargin,
    NetProfitMargin,
    GrossMargin,
    RevenueGrowth,
    EpsGrowth,
    RdIntensity,
    CapexRatio,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::PeRatio,
        Metric::PegRatio,
        Metric::OperatingMargin,
        Metric::NetProfitMargin,
        Metric::GrossMargin,
        Metric::RevenueGrowth,
        Metric::EpsGrowth,
        Metric::RdIntensity,
        Metric::CapexRatio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::PeRatio => "pe_ratio",
            Metric::PegRatio => "peg_ratio",
            Metric::OperatingMargin => "operating_margin",
            Metric::NetProfitMargin => "net_profit_margin",
            Metric::GrossMargin => "gross_margin",
            Metric::RevenueGrowth => "revenue_growth",
            Metric::EpsGrowth => "eps_growth",
            Metric::RdIntensity => "rd_intensity",
            Metric::CapexRatio => "capex_ratio",
        }
    }
}

impl FromStr for Metric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| StoreError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All ratios for one ticker at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioSet {
    pub ticker: String,
    pub as_of_date: AsOf,
    pub pe_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_profit_margin: Option<f64>,
    pub gross_margin: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub eps_growth: Option<f64>,
    pub rd_intensity: Option<f64>,
    pub capex_ratio: Option<f64>,
    /// Metrics whose computation failed, by metric name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_errors: BTreeMap<String, String>,
}

impl RatioSet {
    pub fn new(ticker: &str, as_of_date: AsOf) -> Self {
        Self {
            ticker: ticker.to_string(),
            as_of_date,
            pe_ratio: None,
            peg_ratio: None,
            operating_margin: None,
            net_profit_margin: None,
            gross_margin: None,
            revenue_growth: None,
            eps_growth: None,
            rd_intensity: None,
            capex_ratio: None,
            metric_errors: BTreeMap::new(),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::PeRatio => self.pe_ratio,
            Metric::PegRatio => self.peg_ratio,
            Metric::OperatingMargin => self.operating_margin,
            Metric::NetProfitMargin => self.net_profit_margin,
            Metric::GrossMargin => self.gross_margin,
            Metric::RevenueGrowth => self.revenue_growth,
            Metric::EpsGrowth => self.eps_growth,
            Metric::RdIntensity => self.rd_intensity,
            Metric::CapexRatio => self.capex_ratio,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::PeRatio => &mut self.pe_ratio,
            Metric::PegRatio => &mut self.peg_ratio,
            Metric::OperatingMargin => &mut self.operating_margin,
            Metric::NetProfitMargin => &mut self.net_profit_margin,
            Metric::GrossMargin => &mut self.gross_margin,
            Metric::RevenueGrowth => &mut self.revenue_growth,
            Metric::EpsGrowth => &mut self.eps_growth,
            Metric::RdIntensity => &mut self.rd_intensity,
            Metric::CapexRatio => &mut self.capex_ratio,
        };
        *slot = value;
    }
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `numerator / revenue`, null when either is missing or revenue is zero
fn revenue_ratio(numerator: Option<f64>, revenue: Option<f64>) -> Option<f64> {
    match (numerator, revenue) {
        (Some(numerator), Some(revenue)) if revenue != 0.0 => Some(round_to(numerator / revenue, 4)),
        _ => None,
    }
}

/// Growth from `prior` to `current` relative to the magnitude of `prior`
fn growth(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    match (current, prior) {
        (Some(current), Some(prior)) if prior != 0.0 => Some(round_to((current - prior) / prior.abs(), 4)),
        _ => None,
    }
}

/// Year-over-year growth of `field`, comparing quarter 0 with quarter 4 of a
/// newest-first history
fn year_over_year(
    ticker: &str,
    quarters: &[StatementRow],
    field: impl Fn(&StatementRow) -> Option<f64>,
) -> Option<f64> {
    if quarters.len() <= YEAR_AGO_OFFSET {
        warn!(
            "{}: {} quarters, need {} for year-over-year growth",
            ticker,
            quarters.len(),
            YEAR_AGO_OFFSET + 1
        );
        return None;
    }
    growth(field(&quarters[0]), field(&quarters[YEAR_AGO_OFFSET]))
}

/// Compound annual growth of TTM EPS over `years`, from a newest-first history
pub fn eps_cagr_from_quarters(ticker: &str, quarters: &[StatementRow], years: u32) -> Option<f64> {
    let required = years as usize * TTM_QUARTERS;
    if years == 0 || quarters.len() < required {
        warn!(
            "{}: only {} quarters, need {} for {}-year CAGR",
            ticker,
            quarters.len(),
            required,
            years
        );
        return None;
    }

    let ttm_eps = |window: &[StatementRow]| sum_present(window.iter().map(StatementRow::calculated_eps));
    let current = ttm_eps(&quarters[..TTM_QUARTERS])?;
    let past = ttm_eps(&quarters[required - TTM_QUARTERS..required])?;
    if current <= 0.0 || past <= 0.0 {
        return None;
    }

    Some(round_to((current / past).powf(1.0 / f64::from(years)) - 1.0, 4))
}

/// Per-ticker ratio calculations over prices and quarterly statements
#[derive(Debug, Clone)]
pub struct RatioCalculator {
    reader: DataReader,
    ttm: TtmAggregator,
    peg_growth_years: u32,
}

impl RatioCalculator {
    pub fn new(config: Config) -> Self {
        let peg_growth_years = config.peg_growth_years;
        let reader = DataReader::new(config);
        Self {
            ttm: TtmAggregator::new(reader.clone()),
            reader,
            peg_growth_years,
        }
    }

    pub fn ttm(&self) -> &TtmAggregator {
        &self.ttm
    }

    /// Trailing PE: close price over TTM EPS, 2 dp
    pub fn pe_ratio(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        let Some(price) = self.reader.latest_price_as_of(ticker, as_of)? else {
            warn!("{}: no price data for PE calculation", ticker);
            return Ok(None);
        };

        let ttm = self.ttm.snapshot(ticker, as_of)?;
        if ttm.is_empty() {
            warn!("{}: no fundamental data for PE calculation", ticker);
            return Ok(None);
        }

        match ttm.ttm_eps() {
            Some(eps) if eps != 0.0 => Ok(Some(round_to(price.close / eps, 2))),
            _ => {
                warn!("{}: EPS is zero or missing", ticker);
                Ok(None)
            }
        }
    }

    /// PE over EPS CAGR expressed as a percentage, 2 dp
    pub fn peg_ratio(&self, ticker: &str, years: u32, as_of: AsOf) -> StoreResult<Option<f64>> {
        let pe = match self.pe_ratio(ticker, as_of)? {
            Some(pe) if pe > 0.0 => pe,
            _ => return Ok(None),
        };

        match self.eps_cagr(ticker, years, as_of)? {
            Some(cagr) if cagr > 0.0 => Ok(Some(round_to(pe / (cagr * 100.0), 2))),
            _ => {
                warn!("{}: cannot calculate PEG with negative or zero growth", ticker);
                Ok(None)
            }
        }
    }

    pub fn eps_cagr(&self, ticker: &str, years: u32, as_of: AsOf) -> StoreResult<Option<f64>> {
        let quarters = self.ttm.quarters(ticker, as_of)?;
        if quarters.is_empty() {
            return Ok(None);
        }
        Ok(eps_cagr_from_quarters(ticker, &quarters, years))
    }

    pub fn operating_margin(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        self.ttm_ratio(ticker, as_of, |ttm| revenue_ratio(ttm.operating_income, ttm.revenue))
    }

    pub fn net_profit_margin(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        self.ttm_ratio(ticker, as_of, |ttm| revenue_ratio(ttm.net_income, ttm.revenue))
    }

    pub fn gross_margin(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        self.ttm_ratio(ticker, as_of, |ttm| revenue_ratio(ttm.gross_profit, ttm.revenue))
    }

    /// R&D spend over revenue; R&D is sometimes reported negative
    pub fn rd_intensity(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        self.ttm_ratio(ticker, as_of, |ttm| revenue_ratio(ttm.rd_expense.map(f64::abs), ttm.revenue))
    }

    /// Capital expenditure over revenue; cash-flow capex is usually negative
    pub fn capex_ratio(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        self.ttm_ratio(ticker, as_of, |ttm| revenue_ratio(ttm.capex.map(f64::abs), ttm.revenue))
    }

    pub fn revenue_growth(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        let quarters = self.ttm.quarters(ticker, as_of)?;
        Ok(year_over_year(ticker, &quarters, |q| q.revenue))
    }

    pub fn eps_growth(&self, ticker: &str, as_of: AsOf) -> StoreResult<Option<f64>> {
        let quarters = self.ttm.quarters(ticker, as_of)?;
        Ok(year_over_year(ticker, &quarters, StatementRow::calculated_eps))
    }

    /// Compute a single metric; PEG uses the configured growth horizon
    pub fn metric(&self, ticker: &str, metric: Metric, as_of: AsOf) -> StoreResult<Option<f64>> {
        match metric {
            Metric::PeRatio => self.pe_ratio(ticker, as_of),
            Metric::PegRatio => self.peg_ratio(ticker, self.peg_growth_years, as_of),
            Metric::OperatingMargin => self.operating_margin(ticker, as_of),
            Metric::NetProfitMargin => self.net_profit_margin(ticker, as_of),
            Metric::GrossMargin => self.gross_margin(ticker, as_of),
            Metric::RevenueGrowth => self.revenue_growth(ticker, as_of),
            Metric::EpsGrowth => self.eps_growth(ticker, as_of),
            Metric::RdIntensity => self.rd_intensity(ticker, as_of),
            Metric::CapexRatio => self.capex_ratio(ticker, as_of),
        }
    }

    /// Every metric for `ticker`. A metric that fails is logged, recorded in
    /// `metric_errors` and left null; the others are still computed.
    pub fn get_all_ratios(&self, ticker: &str, as_of: AsOf) -> StoreResult<RatioSet> {
        validate_ticker(ticker)?;

        let mut ratios = RatioSet::new(ticker, as_of);
        for metric in Metric::ALL {
            match self.metric(ticker, metric, as_of) {
                Ok(value) => ratios.set(metric, value),
                Err(e) => {
                    warn!("{}: failed to calculate {}: {}", ticker, metric, e);
                    ratios.metric_errors.insert(metric.name().to_string(), e.to_string());
                }
            }
        }
        Ok(ratios)
    }

    fn ttm_ratio(
        &self,
        ticker: &str,
        as_of: AsOf,
        ratio: impl FnOnce(&TtmSnapshot) -> Option<f64>,
    ) -> StoreResult<Option<f64>> {
        let ttm = self.ttm.snapshot(ticker, as_of)?;
        if ttm.is_empty() {
            return Ok(None);
        }
        Ok(ratio(&ttm))
    }
}
