use crate::error::EngineError;
use crate::models::Bar;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MarketDataSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    symbols: Vec<String>,
    bars: Vec<Bar>,
}

/// In-memory daily price history keyed by symbol.
///
/// Bars are held sorted by date with duplicates rejected at ingest, so every
/// consumer can assume a strictly increasing series.
#[derive(Debug)]
pub struct MarketData {
    bars_by_symbol: BTreeMap<String, Vec<Bar>>,
}

impl MarketData {
    /// Groups loose bars by symbol, sorts each series by date and rejects
    /// duplicate dates with the offending symbol named.
    pub fn from_bars(bars: Vec<Bar>) -> Result<Self, EngineError> {
        let mut bars_by_symbol: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            bars_by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }

        for (symbol, series) in bars_by_symbol.iter_mut() {
            series.sort_by(|a, b| a.date.cmp(&b.date));
            for pair in series.windows(2) {
                if pair[0].date == pair[1].date {
                    return Err(EngineError::DuplicateDate {
                        symbol: symbol.clone(),
                        date: pair[1].date,
                    });
                }
            }
        }

        Ok(Self { bars_by_symbol })
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.bars_by_symbol.keys().map(|s| s.as_str()).collect()
    }

    pub fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars_by_symbol
            .get(symbol)
            .map(|series| series.as_slice())
    }

    pub fn has_data(&self) -> bool {
        self.bars_by_symbol.values().any(|series| !series.is_empty())
    }

    /// Narrows every series to the given date window (inclusive bounds).
    pub fn restrict_to_date_range(
        mut self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Self {
        if start.is_none() && end.is_none() {
            return self;
        }
        for series in self.bars_by_symbol.values_mut() {
            series.retain(|bar| {
                let date = bar.date.date_naive();
                start.map(|s| date >= s).unwrap_or(true) && end.map(|e| date <= e).unwrap_or(true)
            });
        }
        self.bars_by_symbol.retain(|_, series| !series.is_empty());
        self
    }

    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = MarketDataSnapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            symbols: self.symbols().iter().map(|s| s.to_string()).collect(),
            bars: self
                .bars_by_symbol
                .values()
                .flat_map(|series| series.iter().cloned())
                .collect(),
        };

        let file = File::create(path.as_ref()).with_context(|| {
            format!(
                "failed to create snapshot file {}",
                path.as_ref().display()
            )
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &snapshot)
            .context("failed to serialize market data snapshot")?;
        writer
            .flush()
            .context("failed to flush market data snapshot")?;

        info!(
            "Saved market data snapshot with {} symbol{} to {}",
            snapshot.symbols.len(),
            if snapshot.symbols.len() == 1 { "" } else { "s" },
            path.as_ref().display()
        );
        Ok(())
    }

    /// Loads a snapshot written by [`save_snapshot`]. Snapshots are stored
    /// sorted; out-of-order data means a corrupt file and is rejected rather
    /// than silently re-sorted.
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).with_context(|| {
            format!("failed to open snapshot file {}", path.as_ref().display())
        })?;
        let snapshot: MarketDataSnapshot = bincode::deserialize_from(BufReader::new(file))
            .context("failed to deserialize market data snapshot")?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(anyhow!(
                "snapshot version {} is not supported (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            ));
        }

        let mut bars_by_symbol: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in snapshot.bars {
            bars_by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }
        for (symbol, series) in &bars_by_symbol {
            for pair in series.windows(2) {
                if pair[1].date <= pair[0].date {
                    let error = if pair[1].date == pair[0].date {
                        EngineError::DuplicateDate {
                            symbol: symbol.clone(),
                            date: pair[1].date,
                        }
                    } else {
                        EngineError::UnorderedDates {
                            symbol: symbol.clone(),
                            date: pair[1].date,
                        }
                    };
                    return Err(error.into());
                }
            }
        }

        info!(
            "Loaded market data snapshot generated at {} ({} symbols)",
            snapshot.generated_at,
            bars_by_symbol.len()
        );
        Ok(Self { bars_by_symbol })
    }
}

/// Normalizes a symbol by trimming whitespace and uppercasing.
pub fn normalize_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(symbol: &str, day: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            close,
        }
    }

    #[test]
    fn ingest_groups_and_sorts_per_symbol() {
        let data = MarketData::from_bars(vec![
            bar("BBB", 1, 10.0),
            bar("AAA", 2, 102.0),
            bar("AAA", 0, 100.0),
            bar("AAA", 1, 101.0),
        ])
        .unwrap();

        assert_eq!(data.symbols(), vec!["AAA", "BBB"]);
        let aaa = data.bars("AAA").unwrap();
        assert_eq!(aaa.len(), 3);
        assert!(aaa.windows(2).all(|pair| pair[0].date < pair[1].date));
    }

    #[test]
    fn duplicate_dates_are_rejected_with_symbol_named() {
        let err = MarketData::from_bars(vec![bar("AAA", 0, 1.0), bar("AAA", 0, 2.0)]).unwrap_err();
        match err {
            EngineError::DuplicateDate { symbol, .. } => assert_eq!(symbol, "AAA"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn date_range_restriction_drops_empty_series() {
        let data = MarketData::from_bars(vec![bar("AAA", 0, 1.0), bar("BBB", 10, 2.0)]).unwrap();
        let restricted = data.restrict_to_date_range(
            Some(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
            None,
        );
        assert_eq!(restricted.symbols(), vec!["BBB"]);
    }

    #[test]
    fn snapshot_round_trips_through_a_file() {
        let data =
            MarketData::from_bars(vec![bar("AAA", 0, 1.0), bar("AAA", 1, 2.0), bar("BBB", 0, 3.0)])
                .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market-data.bin");
        data.save_snapshot(&path).unwrap();

        let loaded = MarketData::load_snapshot(&path).unwrap();
        assert_eq!(loaded.symbols(), vec!["AAA", "BBB"]);
        assert_eq!(loaded.bars("AAA").unwrap(), data.bars("AAA").unwrap());
    }

    #[test]
    fn normalize_symbol_rejects_blank_input() {
        assert_eq!(normalize_symbol("  aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("   "), None);
    }
}
