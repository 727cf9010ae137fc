pub mod analysis;
pub mod error;
pub mod ingestion;
pub mod models;
pub mod query;
pub mod storage;

pub use analysis::{MetricsEngine, RatioCalculator, TtmAggregator};
pub use error::{StoreError, StoreResult};
pub use ingestion::{DataIngestion, DataSource, SimFinBulkSource};
pub use models::{AsOf, Config, DataKind, PriceRow, StatementPeriod, StatementRow};
pub use query::DataReader;
pub use storage::PartitionedStore;
