use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_WINDOW: usize = 200;
pub const DEFAULT_DISPLAY_WINDOW: usize = 100;
pub const DEFAULT_UNIVERSE: &str = "AAPL,MSFT,GOOGL,AMZN,NVDA";
pub const DEFAULT_BENCHMARK: &str = "SPY";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_HISTORY_LOOKBACK_DAYS: u32 = 365;
pub const DEFAULT_HISTORY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ORDER_NOTIONAL: f64 = 1_000.0;

const SETTING_KEYS: [&str; 10] = [
    "SIGNAL_WINDOW",
    "DISPLAY_WINDOW",
    "UNIVERSE",
    "BENCHMARK",
    "REFRESH_INTERVAL_SECS",
    "HISTORY_LOOKBACK_DAYS",
    "HISTORY_TIMEOUT_SECS",
    "ORDER_NOTIONAL",
    "GATEWAY_BASE_URL",
    "GATEWAY_API_KEY",
];

/// Collects the settings this engine understands from the process
/// environment. Unset keys fall back to defaults during parsing.
pub fn settings_from_env() -> HashMap<String, String> {
    let mut settings = HashMap::new();
    for key in SETTING_KEYS {
        if let Ok(value) = env::var(key) {
            settings.insert(key.to_string(), value);
        }
    }
    // Secret is read separately so the key list above stays printable.
    if let Ok(value) = env::var("GATEWAY_API_SECRET") {
        settings.insert("GATEWAY_API_SECRET".to_string(), value);
    }
    settings
}

/// Signal and universe configuration shared by both operating modes.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub universe: Vec<String>,
    pub benchmark: String,
    pub window: usize,
    pub display_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            universe: parse_symbol_list(DEFAULT_UNIVERSE),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            window: DEFAULT_WINDOW,
            display_window: DEFAULT_DISPLAY_WINDOW,
        }
    }
}

impl StrategyConfig {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let window = optional_setting_usize(settings, "SIGNAL_WINDOW", DEFAULT_WINDOW, 2)?;
        let display_window =
            optional_setting_usize(settings, "DISPLAY_WINDOW", DEFAULT_DISPLAY_WINDOW, 2)?;

        let universe_raw = settings
            .get("UNIVERSE")
            .map(|value| value.as_str())
            .unwrap_or(DEFAULT_UNIVERSE);
        let universe = parse_symbol_list(universe_raw);
        if universe.is_empty() {
            return Err(anyhow!("UNIVERSE must name at least one symbol"));
        }

        let benchmark = settings
            .get("BENCHMARK")
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BENCHMARK.to_string());
        if universe.contains(&benchmark) {
            return Err(anyhow!(
                "BENCHMARK {} must not be part of UNIVERSE",
                benchmark
            ));
        }

        Ok(Self {
            universe,
            benchmark,
            window,
            display_window,
        })
    }
}

/// Live-mode pacing and sizing.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub refresh_interval: Duration,
    pub history_lookback_days: u32,
    pub history_timeout: Duration,
    pub order_notional: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            history_lookback_days: DEFAULT_HISTORY_LOOKBACK_DAYS,
            history_timeout: Duration::from_secs(DEFAULT_HISTORY_TIMEOUT_SECS),
            order_notional: DEFAULT_ORDER_NOTIONAL,
        }
    }
}

impl LiveConfig {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let refresh_secs = optional_setting_u64(
            settings,
            "REFRESH_INTERVAL_SECS",
            DEFAULT_REFRESH_INTERVAL_SECS,
            1,
        )?;
        let lookback_days = optional_setting_u64(
            settings,
            "HISTORY_LOOKBACK_DAYS",
            u64::from(DEFAULT_HISTORY_LOOKBACK_DAYS),
            1,
        )?;
        let timeout_secs = optional_setting_u64(
            settings,
            "HISTORY_TIMEOUT_SECS",
            DEFAULT_HISTORY_TIMEOUT_SECS,
            1,
        )?;
        let order_notional =
            optional_setting_f64(settings, "ORDER_NOTIONAL", DEFAULT_ORDER_NOTIONAL, 1.0)?;

        Ok(Self {
            refresh_interval: Duration::from_secs(refresh_secs),
            history_lookback_days: u32::try_from(lookback_days)
                .map_err(|_| anyhow!("HISTORY_LOOKBACK_DAYS is out of range"))?,
            history_timeout: Duration::from_secs(timeout_secs),
            order_notional,
        })
    }
}

/// Endpoint and credentials for the brokerage gateway. Required only for
/// gateway-backed commands; backtests never touch it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl GatewayConfig {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let base_url = require_setting(settings, "GATEWAY_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let api_key = require_setting(settings, "GATEWAY_API_KEY")?.to_string();
        let api_secret = require_setting(settings, "GATEWAY_API_SECRET")?.to_string();
        Ok(Self {
            base_url,
            api_key,
            api_secret,
        })
    }
}

fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|part| part.trim().to_uppercase())
        .filter(|part| !part.is_empty())
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn optional_setting_u64(
    settings: &HashMap<String, String>,
    key: &str,
    default: u64,
    min: u64,
) -> Result<u64> {
    let Some(raw) = settings.get(key).map(|value| value.trim()) else {
        return Ok(default);
    };
    let value = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize> {
    optional_setting_u64(settings, key, default as u64, min as u64).map(|value| value as usize)
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: f64,
) -> Result<f64> {
    let Some(raw) = settings.get(key).map(|value| value.trim()) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_defaults_apply_when_settings_missing() {
        let config = StrategyConfig::from_settings_map(&HashMap::new()).unwrap();
        assert_eq!(config.window, DEFAULT_WINDOW);
        assert_eq!(config.display_window, DEFAULT_DISPLAY_WINDOW);
        assert_eq!(config.benchmark, "SPY");
        assert_eq!(
            config.universe,
            vec!["AAPL", "AMZN", "GOOGL", "MSFT", "NVDA"]
        );
    }

    #[test]
    fn universe_is_normalized_sorted_and_deduped() {
        let mut settings = HashMap::new();
        settings.insert("UNIVERSE".to_string(), " msft aapl,MSFT ".to_string());
        let config = StrategyConfig::from_settings_map(&settings).unwrap();
        assert_eq!(config.universe, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn benchmark_inside_universe_is_rejected() {
        let mut settings = HashMap::new();
        settings.insert("UNIVERSE".to_string(), "SPY,AAPL".to_string());
        assert!(StrategyConfig::from_settings_map(&settings).is_err());
    }

    #[test]
    fn window_below_minimum_is_rejected() {
        let mut settings = HashMap::new();
        settings.insert("SIGNAL_WINDOW".to_string(), "1".to_string());
        assert!(StrategyConfig::from_settings_map(&settings).is_err());
    }

    #[test]
    fn gateway_config_requires_credentials() {
        let mut settings = HashMap::new();
        settings.insert(
            "GATEWAY_BASE_URL".to_string(),
            "https://gateway.example/v2/".to_string(),
        );
        assert!(GatewayConfig::from_settings_map(&settings).is_err());

        settings.insert("GATEWAY_API_KEY".to_string(), "key".to_string());
        settings.insert("GATEWAY_API_SECRET".to_string(), "secret".to_string());
        let config = GatewayConfig::from_settings_map(&settings).unwrap();
        assert_eq!(config.base_url, "https://gateway.example/v2");
    }
}
