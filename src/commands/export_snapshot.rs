use crate::context::AppContext;
use crate::data::MarketData;
use crate::gateway::GatewayClient;
use crate::retry::retry_transport_operation;
use anyhow::{anyhow, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{info, warn};
use std::path::Path;

/// Pulls daily bars for the universe plus benchmark through the gateway and
/// writes the versioned snapshot file that `backtest` and `signals` read.
pub async fn run(app: &AppContext, output: &Path, lookback_days: Option<u32>) -> Result<()> {
    let strategy = app.strategy_config()?;
    let live = app.live_config()?;
    let gateway = app.gateway_config()?;
    let lookback = lookback_days.unwrap_or(live.history_lookback_days);

    let client = GatewayClient::new(&gateway).context("failed to initialize gateway client")?;

    let mut symbols = strategy.universe.clone();
    symbols.push(strategy.benchmark.clone());
    info!(
        "Fetching {} day{} of history for {} symbol{}",
        lookback,
        if lookback == 1 { "" } else { "s" },
        symbols.len(),
        if symbols.len() == 1 { "" } else { "s" },
    );

    let mut tasks = FuturesUnordered::new();
    for symbol in symbols {
        let client = &client;
        tasks.push(async move {
            let fetch_context = format!("history fetch for {}", symbol);
            let result = retry_transport_operation!(
                fetch_context,
                client.fetch_daily_bars(&symbol, lookback)
            );
            (symbol, result)
        });
    }

    let mut all_bars = Vec::new();
    let mut fetched = 0usize;
    let mut failed = 0usize;
    while let Some((symbol, result)) = tasks.next().await {
        match result {
            Ok(bars) if bars.is_empty() => {
                failed += 1;
                warn!("Gateway returned no bars for {}; skipping", symbol);
            }
            Ok(bars) => {
                fetched += 1;
                info!("Fetched {} bars for {}", bars.len(), symbol);
                all_bars.extend(bars);
            }
            Err(err) => {
                failed += 1;
                warn!("Skipping {} after repeated failures: {}", symbol, err);
            }
        }
    }

    if fetched == 0 {
        return Err(anyhow!("no symbol could be fetched; snapshot not written"));
    }
    if failed > 0 {
        warn!(
            "Snapshot is missing {} symbol{}; downstream runs will name them if required",
            failed,
            if failed == 1 { "" } else { "s" }
        );
    }

    let data = MarketData::from_bars(all_bars).context("gateway returned invalid bar series")?;
    data.save_snapshot(output)?;
    Ok(())
}
