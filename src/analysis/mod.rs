//! Derived metrics: TTM aggregation, per-ticker ratios and batch analysis.

pub mod metrics;
pub mod ratios;
pub mod ttm;

pub use metrics::{BatchRow, MetricFilter, MetricsEngine, RankedRow, SectorAverages, ValuationSummary};
pub use ratios::{Metric, RatioCalculator, RatioSet};
pub use ttm::{TtmAggregator, TtmSnapshot};
