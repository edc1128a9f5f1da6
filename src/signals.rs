use crate::error::EngineError;
use crate::indicators::rolling_mean;
use crate::models::{Bar, DailySignal, SignalSnapshot};

/// Computes the above/below-average signal for every bar index at which the
/// trailing `window`-bar average is defined.
///
/// Indices below `window - 1` produce no entry at all: an unknown stance is
/// absence, not a sell. Pure function of its inputs.
pub fn compute_signals(bars: &[Bar], window: usize) -> Result<Vec<DailySignal>, EngineError> {
    if bars.len() < window {
        let symbol = bars
            .first()
            .map(|bar| bar.symbol.clone())
            .unwrap_or_default();
        return Err(EngineError::InsufficientData {
            symbol,
            bars: bars.len(),
            needed: window,
        });
    }

    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    let means = rolling_mean(&closes, window);

    let mut signals = Vec::with_capacity(bars.len() - window + 1);
    for (i, bar) in bars.iter().enumerate().skip(window - 1) {
        signals.push(DailySignal {
            symbol: bar.symbol.clone(),
            date: bar.date,
            is_above: bar.close > means[i],
        });
    }
    Ok(signals)
}

/// Latest defined signal for a series, or None while history is too short.
pub fn latest_signal(bars: &[Bar], window: usize) -> Option<DailySignal> {
    if bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    let mean = tail.iter().map(|bar| bar.close).sum::<f64>() / window as f64;
    let last = tail.last()?;
    Some(DailySignal {
        symbol: last.symbol.clone(),
        date: last.date,
        is_above: last.close > mean,
    })
}

/// Current stance plus the averages behind it, for display. The shorter
/// display average is optional: it may be undefined while the long one is
/// not configured larger, so both are checked independently.
pub fn signal_snapshot(bars: &[Bar], window: usize, display_window: usize) -> Option<SignalSnapshot> {
    let signal = latest_signal(bars, window)?;
    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    let long_average = closes[closes.len() - window..].iter().sum::<f64>() / window as f64;
    let display_average = if bars.len() >= display_window && display_window > 0 {
        Some(closes[closes.len() - display_window..].iter().sum::<f64>() / display_window as f64)
    } else {
        None
    };
    let last = bars.last()?;

    Some(SignalSnapshot {
        symbol: last.symbol.clone(),
        date: last.date,
        close: last.close,
        long_average,
        display_average,
        is_above: signal.is_above,
    })
}
