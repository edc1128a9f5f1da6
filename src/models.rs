use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One daily bar. The strategy consumes closing prices exclusively, so the
/// richer OHLCV shape never made it into this model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub close: f64,
}

/// Signal for one symbol on one date. A signal only exists once the moving
/// average is defined; "no signal yet" is modeled as absence, never as a
/// default stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySignal {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub is_above: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A market order. Immutable once submitted; everything past broker
/// acknowledgment is the broker's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    /// Sizing hint in account currency; the gateway resolves it to shares.
    pub notional: f64,
}

impl Order {
    pub fn market(symbol: &str, side: OrderSide, notional: f64) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            notional,
        }
    }
}

/// Broker-reported holding. Ground truth at each decision point; the
/// reconciler never trusts its own memory over this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: i64,
    pub owned: bool,
}

/// Target portfolio weights over the configured universe. Weights sum to at
/// most 1.0; any shortfall is implicit cash.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetAllocation {
    weights: BTreeMap<String, f64>,
}

impl TargetAllocation {
    pub fn set_weight(&mut self, symbol: &str, weight: f64) {
        self.weights.insert(symbol.to_string(), weight);
    }

    /// Weight for a symbol; 0.0 for anything outside the universe.
    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn invested(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Symbols in lexical order, so downstream iteration is reproducible.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }
}

/// Summary statistics for one daily-return series.
///
/// `annualized_return` uses the (1 + mean_daily)^252 - 1 approximation of
/// compounding the mean daily return over a 252-day trading year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStats {
    pub mean_daily_return: f64,
    pub std_daily_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativePoint {
    pub date: DateTime<Utc>,
    pub strategy: f64,
    pub benchmark: f64,
}

/// Structured backtest output for downstream rendering; chart generation is
/// a consumer of this report, not part of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    pub window: usize,
    pub universe: Vec<String>,
    pub benchmark_symbol: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub trading_days: usize,
    pub strategy: SeriesStats,
    pub benchmark: SeriesStats,
    pub cumulative: Vec<CumulativePoint>,
}

/// Per-symbol stance for the `signals` display command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSnapshot {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub close: f64,
    pub long_average: f64,
    pub display_average: Option<f64>,
    pub is_above: bool,
}
