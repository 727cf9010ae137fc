use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_yield::analysis::{MetricFilter, MetricsEngine};
use rust_yield::ingestion::{DataIngestion, SimFinBulkSource};
use rust_yield::models::{AsOf, Config};

/// Partitioned price and fundamentals store with ratio analysis
#[derive(Parser)]
#[command(
    name = "rust-yield",
    version,
    about = "📈 Price and fundamentals store with ratio screening",
    long_about = "Loads SimFin bulk downloads into a partitioned CSV store and computes trailing ratios (PE, PEG, margins, growth) on demand."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load prices and fundamentals from the SimFin bulk directory
    Ingest {
        /// Tickers to load (default: every ticker with prices)
        #[arg(long, short, value_delimiter = ',', conflicts_with = "sp500")]
        tickers: Option<Vec<String>>,

        /// Load only the large-cap S&P 500 universe
        #[arg(long)]
        sp500: bool,

        /// Drop prices before this date (YYYY-MM-DD)
        #[arg(long, short)]
        start_date: Option<NaiveDate>,

        /// Skip quarterly and annual statements
        #[arg(long)]
        prices_only: bool,
    },

    /// Append prices newer than the stored ones
    UpdatePrices {
        #[arg(long, short, value_delimiter = ',')]
        tickers: Option<Vec<String>>,
    },

    /// Show ticker counts and sample date ranges
    Summary,

    /// Check the bulk directory has the files and columns analysis needs
    Validate,

    /// All ratios for one ticker
    Ratios {
        ticker: String,

        /// Compute as of this date (YYYY-MM-DD) instead of the latest data
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Include latest price and TTM revenue / net income
        #[arg(long)]
        valuation: bool,
    },

    /// Tickers whose ratios fall within the given bounds
    Screen {
        /// Bounds as metric=min:max, either side may be empty (e.g. pe_ratio=0:25)
        #[arg(long = "filter", short)]
        filters: Vec<MetricFilter>,

        #[arg(long, short, value_delimiter = ',')]
        tickers: Option<Vec<String>>,
    },

    /// Rank tickers by one metric
    Rank {
        metric: String,

        #[arg(long, short)]
        descending: bool,

        #[arg(long, short = 'n')]
        top_n: Option<usize>,

        #[arg(long, short, value_delimiter = ',')]
        tickers: Option<Vec<String>>,
    },

    /// Side-by-side metrics for several tickers
    Compare {
        #[arg(required = true)]
        tickers: Vec<String>,

        #[arg(long, short, value_delimiter = ',')]
        metrics: Option<Vec<String>>,
    },

    /// Average ratios over a group of tickers
    Average {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rust_yield={}", config.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("🚀 rust-yield using data at {}", config.data_path.display());

    match cli.command {
        Command::Ingest {
            tickers,
            sp500,
            start_date,
            prices_only,
        } => {
            let source = SimFinBulkSource::from_config(&config);
            let ingestion = DataIngestion::new(config, source)?;
            let summary = if sp500 {
                ingestion.download_sp500(start_date)?
            } else {
                ingestion.update_all_data(tickers.as_deref(), start_date, !prices_only)?
            };
            print_json(&summary)
        }
        Command::UpdatePrices { tickers } => {
            let source = SimFinBulkSource::from_config(&config);
            let ingestion = DataIngestion::new(config, source)?;
            print_json(&ingestion.update_prices_incremental(tickers.as_deref())?)
        }
        Command::Summary => {
            let source = SimFinBulkSource::from_config(&config);
            let ingestion = DataIngestion::new(config, source)?;
            print_json(&ingestion.data_summary()?)
        }
        Command::Validate => {
            let report = SimFinBulkSource::from_config(&config).validate()?;
            print_json(&report)?;
            if !report.all_passed {
                let failed: Vec<&str> = report.failed().map(|r| r.name.as_str()).collect();
                bail!("Validation failed: {}", failed.join(", "));
            }
            Ok(())
        }
        Command::Ratios {
            ticker,
            as_of,
            valuation,
        } => {
            let engine = MetricsEngine::new(config);
            if valuation {
                print_json(&engine.valuation_summary(&ticker, AsOf::from(as_of))?)
            } else {
                print_json(&engine.calculator().get_all_ratios(&ticker, AsOf::from(as_of))?)
            }
        }
        Command::Screen { filters, tickers } => {
            let engine = MetricsEngine::new(config);
            print_json(&engine.screen(&filters, tickers.as_deref())?)
        }
        Command::Rank {
            metric,
            descending,
            top_n,
            tickers,
        } => {
            let engine = MetricsEngine::new(config);
            print_json(&engine.rank(&metric, tickers.as_deref(), !descending, top_n)?)
        }
        Command::Compare { tickers, metrics } => {
            let engine = MetricsEngine::new(config);
            print_json(&engine.compare(&tickers, metrics.as_deref())?)
        }
        Command::Average { tickers } => {
            let engine = MetricsEngine::new(config);
            print_json(&engine.sector_average(&tickers)?)
        }
    }
}
