use crate::context::AppContext;
use crate::signals::signal_snapshot;
use anyhow::Result;
use log::{info, warn};
use std::path::Path;

/// Prints the current stance per universe symbol from a snapshot file, with
/// the long moving average and the shorter display average next to the last
/// close.
pub async fn run(app: &AppContext, data_file: &Path) -> Result<()> {
    let config = app.strategy_config()?;
    let data = app.market_data_from_file(data_file)?;

    for symbol in &config.universe {
        let Some(bars) = data.bars(symbol) else {
            warn!("{}: no data in snapshot", symbol);
            continue;
        };
        match signal_snapshot(bars, config.window, config.display_window) {
            Some(snapshot) => {
                let display = snapshot
                    .display_average
                    .map(|value| format!("{:.2}", value))
                    .unwrap_or_else(|| "n/a".to_string());
                info!(
                    "{}: close {:.2} on {} | MA{} {:.2} | MA{} {} | {}",
                    snapshot.symbol,
                    snapshot.close,
                    snapshot.date.format("%Y-%m-%d"),
                    config.window,
                    snapshot.long_average,
                    config.display_window,
                    display,
                    if snapshot.is_above { "HOLD" } else { "FLAT" },
                );
            }
            None => warn!(
                "{}: insufficient history for a {}-day average ({} bars)",
                symbol,
                config.window,
                bars.len()
            ),
        }
    }

    Ok(())
}
