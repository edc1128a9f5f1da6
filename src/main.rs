use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use trendgate::commands::{backtest, export_snapshot, signals, trade};
use trendgate::context::AppContext;

const DEFAULT_MARKET_DATA_FILE: &str = "data/market-data.bin";

#[derive(Parser)]
#[command(name = "trendgate")]
#[command(about = "Moving-average trend following: backtests and live gateway execution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a market data snapshot and report strategy vs benchmark statistics
    Backtest {
        /// Path to the market data snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Write the JSON report here instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// First date to include (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        start_date: Option<chrono::NaiveDate>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        end_date: Option<chrono::NaiveDate>,
    },
    /// Show the current stance per universe symbol from a snapshot
    Signals {
        /// Path to the market data snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
    },
    /// Run the live reconciliation loop against the brokerage gateway
    Trade,
    /// Export a market data snapshot for offline runs
    ExportSnapshot {
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
        /// Calendar days of history to request per symbol
        #[arg(long)]
        lookback_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let app_context = AppContext::initialize();

    info!("Starting trendgate. Not financial advice; use at your own risk.");

    match cli.command {
        Commands::Backtest {
            data_file,
            output,
            start_date,
            end_date,
        } => {
            let data_file = resolve_market_data_path(data_file);
            backtest::run(
                &app_context,
                &data_file,
                output.as_deref(),
                start_date,
                end_date,
            )
            .await?;
        }
        Commands::Signals { data_file } => {
            let data_file = resolve_market_data_path(data_file);
            signals::run(&app_context, &data_file).await?;
        }
        Commands::Trade => {
            trade::run(&app_context).await?;
        }
        Commands::ExportSnapshot {
            output,
            lookback_days,
        } => {
            let output = resolve_market_data_path(output);
            export_snapshot::run(&app_context, &output, lookback_days).await?;
        }
    }

    Ok(())
}

fn resolve_market_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }
    PathBuf::from(DEFAULT_MARKET_DATA_FILE)
}
