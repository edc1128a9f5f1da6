use crate::models::SeriesStats;
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summarizes a daily-return series.
///
/// Annualized return compounds the mean daily return over a 252-day year,
/// (1 + mean)^252 - 1; sharpe is mean/std scaled by sqrt(252), with no
/// risk-free adjustment. Degenerate series (fewer than two returns, or zero
/// dispersion) report zero rather than NaN.
pub fn series_stats(daily_returns: &[f64]) -> SeriesStats {
    if daily_returns.is_empty() {
        return SeriesStats {
            mean_daily_return: 0.0,
            std_daily_return: 0.0,
            annualized_return: 0.0,
            sharpe_ratio: 0.0,
        };
    }

    let mean = daily_returns.iter().mean();
    let std = if daily_returns.len() < 2 {
        0.0
    } else {
        daily_returns.iter().std_dev()
    };

    let annualized = (1.0 + mean).powf(TRADING_DAYS_PER_YEAR) - 1.0;
    let sharpe = if std > 0.0 {
        mean / std * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    SeriesStats {
        mean_daily_return: mean,
        std_daily_return: std,
        annualized_return: annualized,
        sharpe_ratio: sharpe,
    }
}

/// Running product of (1 + r) - 1 over a daily-return series.
pub fn cumulative_returns(daily_returns: &[f64]) -> Vec<f64> {
    let mut growth = 1.0;
    daily_returns
        .iter()
        .map(|r| {
            growth *= 1.0 + r;
            growth - 1.0
        })
        .collect()
}
