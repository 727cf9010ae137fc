use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::analysis::ratios::{round_to, Metric, RatioCalculator, RatioSet};
use crate::error::{StoreError, StoreResult};
use crate::models::{AsOf, Config, DataKind};
use crate::query::{DataReader, Table, Value};

/// Outcome of the ratio calculation for one ticker in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchRow {
    Ratios(RatioSet),
    Failed { ticker: String, error: String },
}

impl BatchRow {
    pub fn ticker(&self) -> &str {
        match self {
            BatchRow::Ratios(ratios) => ratios.ticker.as_str(),
            BatchRow::Failed { ticker, .. } => ticker.as_str(),
        }
    }

    pub fn ratios(&self) -> Option<&RatioSet> {
        match self {
            BatchRow::Ratios(ratios) => Some(ratios),
            BatchRow::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BatchRow::Ratios(_) => None,
            BatchRow::Failed { error, .. } => Some(error.as_str()),
        }
    }

    /// Metric value; failed rows have no values
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.ratios().and_then(|r| r.get(metric))
    }
}

/// Inclusive bounds on one metric, parsed from `metric=min:max`.
///
/// Either bound may be left empty: `pe_ratio=:25`, `operating_margin=0.1:`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFilter {
    pub metric: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricFilter {
    pub fn new(metric: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            metric: metric.to_string(),
            min,
            max,
        }
    }

    /// Nulls never satisfy a bound
    pub fn accepts(&self, value: Option<f64>) -> bool {
        let Some(value) = value else {
            return self.min.is_none() && self.max.is_none();
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl FromStr for MetricFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (metric, bounds) = s
            .split_once('=')
            .ok_or_else(|| format!("expected metric=min:max, got '{}'", s))?;
        let (min, max) = bounds
            .split_once(':')
            .ok_or_else(|| format!("expected min:max bounds, got '{}'", bounds))?;

        let parse_bound = |raw: &str| -> Result<Option<f64>, String> {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse::<f64>()
                .map(Some)
                .map_err(|e| format!("invalid bound '{}': {}", raw, e))
        };

        Ok(MetricFilter::new(metric.trim(), parse_bound(min)?, parse_bound(max)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub rank: usize,
    pub ticker: String,
    pub value: f64,
}

/// Mean of each metric over the tickers that have it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectorAverages {
    #[serde(flatten)]
    pub averages: BTreeMap<String, f64>,
    pub ticker_count: usize,
}

impl SectorAverages {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.averages.get(metric.name()).copied()
    }
}

/// Ratios plus the price and TTM figures they were derived from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationSummary {
    #[serde(flatten)]
    pub ratios: RatioSet,
    pub current_price: Option<f64>,
    pub price_date: Option<NaiveDate>,
    pub ttm_revenue: Option<f64>,
    pub ttm_net_income: Option<f64>,
}

/// Batch ratio calculations across a ticker universe
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    reader: DataReader,
    calculator: RatioCalculator,
}

impl MetricsEngine {
    pub fn new(config: Config) -> Self {
        Self {
            reader: DataReader::new(config.clone()),
            calculator: RatioCalculator::new(config),
        }
    }

    pub fn calculator(&self) -> &RatioCalculator {
        &self.calculator
    }

    /// Ratios for each ticker, in input order. Defaults to every ticker with
    /// price data; a failing ticker becomes a `BatchRow::Failed` entry.
    pub fn calculate_all(&self, tickers: Option<&[String]>, as_of: AsOf) -> StoreResult<Vec<BatchRow>> {
        let universe = match tickers {
            Some(tickers) => tickers.to_vec(),
            None => {
                let tickers = self.reader.list_tickers(DataKind::Prices)?;
                if tickers.is_empty() {
                    return Err(StoreError::NoData("no price partitions in store".to_string()));
                }
                tickers
            }
        };

        info!("📊 Calculating ratios for {} tickers", universe.len());
        let mut rows = Vec::with_capacity(universe.len());
        for ticker in &universe {
            match self.calculator.get_all_ratios(ticker, as_of) {
                Ok(ratios) => rows.push(BatchRow::Ratios(ratios)),
                Err(e) => {
                    warn!("Error calculating ratios for {}: {}", ticker, e);
                    rows.push(BatchRow::Failed {
                        ticker: ticker.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let failed = rows.iter().filter(|r| r.error().is_some()).count();
        info!("✅ Calculated ratios for {} tickers ({} failed)", rows.len() - failed, failed);
        Ok(rows)
    }

    /// Rows whose metrics fall within every filter's inclusive bounds.
    /// Filters on unknown metrics are skipped.
    pub fn screen(&self, filters: &[MetricFilter], tickers: Option<&[String]>) -> StoreResult<Vec<BatchRow>> {
        let rows = self.calculate_all(tickers, AsOf::Latest)?;
        Ok(apply_filters(rows, filters))
    }

    /// `ticker` plus the requested metric columns (all metrics by default)
    pub fn compare(&self, tickers: &[String], metrics: Option<&[String]>) -> StoreResult<Table> {
        let rows = self.calculate_all(Some(tickers), AsOf::Latest)?;
        Ok(comparison_table(&rows, metrics))
    }

    /// Tickers ordered by `metric`, nulls excluded, ranks starting at 1
    pub fn rank(
        &self,
        metric: &str,
        tickers: Option<&[String]>,
        ascending: bool,
        top_n: Option<usize>,
    ) -> StoreResult<Vec<RankedRow>> {
        let Ok(metric) = metric.parse::<Metric>() else {
            error!("Metric {} not found", metric);
            return Ok(Vec::new());
        };
        let rows = self.calculate_all(tickers, AsOf::Latest)?;
        Ok(rank_rows(&rows, metric, ascending, top_n))
    }

    /// Per-metric mean over a group of tickers
    pub fn sector_average(&self, tickers: &[String]) -> StoreResult<SectorAverages> {
        let rows = self.calculate_all(Some(tickers), AsOf::Latest)?;
        Ok(average_rows(&rows, tickers.len()))
    }

    /// Ratios with the close and TTM totals they were computed from, all taken as of `as_of`
    pub fn valuation_summary(&self, ticker: &str, as_of: AsOf) -> StoreResult<ValuationSummary> {
        let ratios = self.calculator.get_all_ratios(ticker, as_of)?;
        let price = self.reader.latest_price_as_of(ticker, as_of)?;
        let ttm = self.calculator.ttm().snapshot(ticker, as_of)?;

        Ok(ValuationSummary {
            ratios,
            current_price: price.as_ref().map(|p| p.close),
            price_date: price.as_ref().map(|p| p.date),
            ttm_revenue: ttm.revenue,
            ttm_net_income: ttm.net_income,
        })
    }
}

/// Keep rows passing every filter on a known metric
pub fn apply_filters(rows: Vec<BatchRow>, filters: &[MetricFilter]) -> Vec<BatchRow> {
    let mut resolved = Vec::with_capacity(filters.len());
    for filter in filters {
        match filter.metric.parse::<Metric>() {
            Ok(metric) => resolved.push((metric, filter)),
            Err(_) => warn!("Column {} not in results, skipping", filter.metric),
        }
    }

    rows.into_iter()
        .filter(|row| resolved.iter().all(|(metric, filter)| filter.accepts(row.value(*metric))))
        .collect()
}

/// One row per ticker. Without an explicit metric list every metric is shown
/// followed by an `error` column holding the failure of tickers that could not be computed.
pub fn comparison_table(rows: &[BatchRow], metrics: Option<&[String]>) -> Table {
    let (selected, with_error): (Vec<Metric>, bool) = match metrics {
        Some(names) => (names.iter().filter_map(|name| name.parse().ok()).collect(), false),
        None => (Metric::ALL.to_vec(), true),
    };

    let mut columns = vec!["ticker".to_string()];
    columns.extend(selected.iter().map(|m| m.name().to_string()));
    if with_error {
        columns.push("error".to_string());
    }

    let mut table = Table::new(columns);
    for row in rows {
        let mut values = vec![Value::from(row.ticker())];
        values.extend(selected.iter().map(|m| Value::from(row.value(*m))));
        if with_error {
            values.push(row.error().map_or(Value::Null, Value::from));
        }
        table.push_row(values);
    }
    table
}

pub fn rank_rows(rows: &[BatchRow], metric: Metric, ascending: bool, top_n: Option<usize>) -> Vec<RankedRow> {
    let mut present: Vec<(&str, f64)> = rows
        .iter()
        .filter_map(|row| row.value(metric).map(|value| (row.ticker(), value)))
        .collect();

    present.sort_by(|a, b| {
        let ordering = a.1.total_cmp(&b.1);
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });

    present
        .into_iter()
        .take(top_n.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (ticker, value))| RankedRow {
            rank: i + 1,
            ticker: ticker.to_string(),
            value,
        })
        .collect()
}

pub fn average_rows(rows: &[BatchRow], ticker_count: usize) -> SectorAverages {
    let mut averages = BTreeMap::new();
    for metric in Metric::ALL {
        let values: Vec<f64> = rows.iter().filter_map(|row| row.value(metric)).collect();
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        averages.insert(metric.name().to_string(), round_to(mean, 4));
    }
    SectorAverages { averages, ticker_count }
}
