/// Trailing simple moving average over `window` values.
///
/// Entries before a full window exist are NaN rather than a best-effort
/// partial mean, so callers can tell "undefined" apart from a real value.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return vec![f64::NAN; values.len()];
    }

    let mut means = vec![f64::NAN; values.len()];
    let mut window_sum: f64 = values[..window].iter().sum();
    means[window - 1] = window_sum / window as f64;
    for i in window..values.len() {
        window_sum += values[i] - values[i - window];
        means[i] = window_sum / window as f64;
    }

    means
}
