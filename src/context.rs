use crate::config::{
    settings_from_env, GatewayConfig, LiveConfig, StrategyConfig,
};
use crate::data::MarketData;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

/// Holds the settings snapshot taken at startup and hands out the typed
/// configuration views each command needs.
#[derive(Clone)]
pub struct AppContext {
    settings: HashMap<String, String>,
}

impl AppContext {
    pub fn initialize() -> Self {
        Self {
            settings: settings_from_env(),
        }
    }

    #[cfg(test)]
    pub fn with_settings(settings: HashMap<String, String>) -> Self {
        Self { settings }
    }

    pub fn strategy_config(&self) -> Result<StrategyConfig> {
        StrategyConfig::from_settings_map(&self.settings)
    }

    pub fn live_config(&self) -> Result<LiveConfig> {
        LiveConfig::from_settings_map(&self.settings)
    }

    /// Gateway credentials are only demanded by the commands that talk to
    /// the broker; backtests never require them.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        GatewayConfig::from_settings_map(&self.settings)
    }

    pub fn market_data_from_file<P: AsRef<Path>>(&self, path: P) -> Result<MarketData> {
        MarketData::load_snapshot(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_configuration_needs_no_gateway_credentials() {
        let ctx = AppContext::with_settings(HashMap::new());
        assert!(ctx.strategy_config().is_ok());
        assert!(ctx.live_config().is_ok());
        assert!(ctx.gateway_config().is_err());
    }
}
