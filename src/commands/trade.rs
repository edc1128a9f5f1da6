use crate::context::AppContext;
use crate::gateway::GatewayClient;
use crate::reconciler::LiveReconciler;
use anyhow::{Context, Result};
use log::info;
use tokio::sync::watch;

/// Runs the live reconciliation loop against the configured gateway until
/// interrupted. Ctrl-C stops cleanly: pending work is abandoned and no
/// further orders are submitted.
pub async fn run(app: &AppContext) -> Result<()> {
    let strategy = app.strategy_config()?;
    let live = app.live_config()?;
    let gateway = app.gateway_config()?;

    info!(
        "Trading {} symbols, {}-day window, refresh every {}s",
        strategy.universe.len(),
        strategy.window,
        live.refresh_interval.as_secs()
    );

    let transport =
        GatewayClient::new(&gateway).context("failed to initialize gateway client")?;
    let reconciler = LiveReconciler::new(transport, strategy, live);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping after in-flight work is abandoned");
            let _ = stop_tx.send(true);
        }
    });

    reconciler.run(stop_rx).await
}
