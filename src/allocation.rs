use crate::models::{DailySignal, TargetAllocation};
use std::collections::HashMap;

/// Maps the latest per-symbol signals to target weights.
///
/// Every universe symbol gets an entry. Eligible symbols (latest signal
/// above the average) each receive a fixed 1/N slice where N is the size of
/// the whole universe, not the eligible subset; the unallocated remainder
/// stays in cash. Renormalizing over the eligible subset would change risk
/// exposure, so the denominator is deliberately fixed.
pub fn plan_allocation(
    latest_signals: &HashMap<String, DailySignal>,
    universe: &[String],
) -> TargetAllocation {
    let mut allocation = TargetAllocation::default();
    if universe.is_empty() {
        return allocation;
    }

    let slice = 1.0 / universe.len() as f64;
    for symbol in universe {
        let eligible = latest_signals
            .get(symbol)
            .map(|signal| signal.is_above)
            .unwrap_or(false);
        allocation.set_weight(symbol, if eligible { slice } else { 0.0 });
    }

    allocation
}
