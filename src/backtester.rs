use crate::allocation::plan_allocation;
use crate::config::StrategyConfig;
use crate::data::MarketData;
use crate::error::EngineError;
use crate::indicators::rolling_mean;
use crate::models::{BacktestReport, CumulativePoint, DailySignal};
use crate::performance::series_stats;
use std::collections::{BTreeSet, HashMap};

/// Replays history one trading day at a time, driving the signal engine and
/// allocation planner with data up to the previous close only.
///
/// The central correctness property is no-lookahead: the weights applied to
/// day t's returns are derived from signals through day t-1, never from day
/// t's own close.
pub struct BacktestSimulator<'a> {
    data: &'a MarketData,
    config: &'a StrategyConfig,
}

struct AlignedSeries {
    closes: Vec<f64>,
    means: Vec<f64>,
}

impl<'a> BacktestSimulator<'a> {
    pub fn new(data: &'a MarketData, config: &'a StrategyConfig) -> Self {
        Self { data, config }
    }

    pub fn run(&self) -> Result<BacktestReport, EngineError> {
        let window = self.config.window;
        let needed = window + 1;

        let mut tracked: Vec<String> = self.config.universe.clone();
        tracked.push(self.config.benchmark.clone());

        // Fail fast per symbol before alignment so the offender is named.
        for symbol in &tracked {
            let series = self.data.bars(symbol).ok_or_else(|| EngineError::NoData {
                symbol: symbol.clone(),
            })?;
            if series.is_empty() {
                return Err(EngineError::NoData {
                    symbol: symbol.clone(),
                });
            }
            if series.len() < needed {
                return Err(EngineError::InsufficientData {
                    symbol: symbol.clone(),
                    bars: series.len(),
                    needed,
                });
            }
        }

        // Trade only on dates every tracked series has a close for.
        let dates = self.common_dates(&tracked);
        if dates.len() < needed {
            let shortest = self.shortest_symbol(&tracked);
            return Err(EngineError::InsufficientData {
                symbol: shortest,
                bars: dates.len(),
                needed,
            });
        }

        let mut aligned: HashMap<&str, AlignedSeries> = HashMap::new();
        for symbol in &tracked {
            let by_date: HashMap<_, _> = self
                .data
                .bars(symbol)
                .expect("tracked symbols validated above")
                .iter()
                .map(|bar| (bar.date, bar.close))
                .collect();
            let closes: Vec<f64> = dates.iter().map(|date| by_date[date]).collect();
            let means = rolling_mean(&closes, window);
            aligned.insert(symbol.as_str(), AlignedSeries { closes, means });
        }

        let benchmark = &aligned[self.config.benchmark.as_str()];
        let mut strategy_returns = Vec::with_capacity(dates.len() - 1);
        let mut benchmark_returns = Vec::with_capacity(dates.len() - 1);
        let mut cumulative = Vec::with_capacity(dates.len() - 1);
        let mut strategy_growth = 1.0;
        let mut benchmark_growth = 1.0;

        for t in 1..dates.len() {
            // Signals as of the previous close; absent while the average is
            // still undefined there.
            let signal_index = t - 1;
            let mut latest: HashMap<String, DailySignal> = HashMap::new();
            for symbol in &self.config.universe {
                let series = &aligned[symbol.as_str()];
                let mean = series.means[signal_index];
                if mean.is_nan() {
                    continue;
                }
                latest.insert(
                    symbol.clone(),
                    DailySignal {
                        symbol: symbol.clone(),
                        date: dates[signal_index],
                        is_above: series.closes[signal_index] > mean,
                    },
                );
            }
            let allocation = plan_allocation(&latest, &self.config.universe);

            let mut strategy_return = 0.0;
            for symbol in &self.config.universe {
                let series = &aligned[symbol.as_str()];
                let daily = series.closes[t] / series.closes[t - 1] - 1.0;
                strategy_return += allocation.weight(symbol) * daily;
            }
            let benchmark_return = benchmark.closes[t] / benchmark.closes[t - 1] - 1.0;

            strategy_growth *= 1.0 + strategy_return;
            benchmark_growth *= 1.0 + benchmark_return;
            strategy_returns.push(strategy_return);
            benchmark_returns.push(benchmark_return);
            cumulative.push(CumulativePoint {
                date: dates[t],
                strategy: strategy_growth - 1.0,
                benchmark: benchmark_growth - 1.0,
            });
        }

        Ok(BacktestReport {
            window,
            universe: self.config.universe.clone(),
            benchmark_symbol: self.config.benchmark.clone(),
            start_date: dates[0],
            end_date: *dates.last().expect("dates validated non-empty"),
            trading_days: dates.len(),
            strategy: series_stats(&strategy_returns),
            benchmark: series_stats(&benchmark_returns),
            cumulative,
        })
    }

    fn common_dates(&self, tracked: &[String]) -> Vec<chrono::DateTime<chrono::Utc>> {
        let mut common: Option<BTreeSet<_>> = None;
        for symbol in tracked {
            let dates: BTreeSet<_> = self
                .data
                .bars(symbol)
                .map(|series| series.iter().map(|bar| bar.date).collect())
                .unwrap_or_default();
            common = Some(match common {
                Some(existing) => existing.intersection(&dates).copied().collect(),
                None => dates,
            });
        }
        common.unwrap_or_default().into_iter().collect()
    }

    fn shortest_symbol(&self, tracked: &[String]) -> String {
        tracked
            .iter()
            .min_by_key(|symbol| self.data.bars(symbol).map(|s| s.len()).unwrap_or(0))
            .cloned()
            .unwrap_or_default()
    }
}
