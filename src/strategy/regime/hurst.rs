//! Hurst Exponent via Rescaled Range (R/S) Analysis
//!
//! H < 0.5: anti-persistent (mean reverting), H ~ 0.5: random walk,
//! H > 0.5: persistent (trending).
//!
//! Works on log returns. For each sub-window length `n` in `2..min(len/2, 50)`
//! the R/S statistic of the first `n` returns is computed, and H is the slope
//! of `ln(R/S)` against `ln(n)`, clamped to [0, 1].

use super::stats::{mean, ols_slope, sample_std};

/// Fewer closes than this yields no estimate
pub const MIN_CLOSES: usize = 50;
const MIN_RETURNS: usize = 20;
const MAX_LAG: usize = 50;
const MIN_POINTS: usize = 5;

/// Estimate the Hurst exponent from the last `period` closes.
///
/// Returns `None` when the window is too short, prices are non-positive, or
/// returns have zero variance for too many sub-windows.
pub fn hurst_exponent(closes: &[f64], period: usize) -> Option<f64> {
    let start = closes.len().saturating_sub(period);
    let window = &closes[start..];
    if window.len() < MIN_CLOSES {
        return None;
    }

    let returns: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .filter(|r| r.is_finite())
        .collect();
    if returns.len() < MIN_RETURNS {
        return None;
    }

    let max_lag = (returns.len() / 2).min(MAX_LAG);
    let mut log_lags = Vec::with_capacity(max_lag);
    let mut log_rs = Vec::with_capacity(max_lag);
    for lag in 2..max_lag {
        if let Some(rs) = rescaled_range(&returns[..lag]) {
            let (x, y) = ((lag as f64).ln(), rs.ln());
            if x.is_finite() && y.is_finite() {
                log_lags.push(x);
                log_rs.push(y);
            }
        }
    }
    if log_lags.len() < MIN_POINTS {
        return None;
    }

    ols_slope(&log_lags, &log_rs).map(|h| h.clamp(0.0, 1.0))
}

/// R/S of one sub-window: range of cumulative deviations over sample std
fn rescaled_range(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    let s = sample_std(xs)?;
    if s <= 0.0 {
        return None;
    }
    let mut cum = 0.0;
    let mut hi = f64::NEG_INFINITY;
    let mut lo = f64::INFINITY;
    for x in xs {
        cum += x - m;
        hi = hi.max(cum);
        lo = lo.min(cum);
    }
    Some((hi - lo) / s)
}
