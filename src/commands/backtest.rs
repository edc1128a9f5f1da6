use crate::backtester::BacktestSimulator;
use crate::context::AppContext;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use std::fs;
use std::path::Path;

pub async fn run(
    app: &AppContext,
    data_file: &Path,
    output: Option<&Path>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<()> {
    let config = app.strategy_config()?;
    let data = app
        .market_data_from_file(data_file)?
        .restrict_to_date_range(start_date, end_date);

    let simulator = BacktestSimulator::new(&data, &config);
    let report = simulator
        .run()
        .context("backtest aborted before producing a report")?;

    info!(
        "Backtested {} symbols vs {} over {} trading days ({} to {})",
        report.universe.len(),
        report.benchmark_symbol,
        report.trading_days,
        report.start_date.format("%Y-%m-%d"),
        report.end_date.format("%Y-%m-%d"),
    );
    info!(
        "Strategy: mean daily {:.5}, annualized {:.2}%, sharpe {:.2}",
        report.strategy.mean_daily_return,
        report.strategy.annualized_return * 100.0,
        report.strategy.sharpe_ratio
    );
    info!(
        "Benchmark: mean daily {:.5}, annualized {:.2}%, sharpe {:.2}",
        report.benchmark.mean_daily_return,
        report.benchmark.annualized_return * 100.0,
        report.benchmark.sharpe_ratio
    );

    let rendered =
        serde_json::to_string_pretty(&report).context("failed to serialize backtest report")?;
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!("Wrote backtest report to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
