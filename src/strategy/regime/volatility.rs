//! Volatility and direction indicators
//!
//! ATR, Bollinger band width, ATR percentile and EMA slope. All of them
//! return a neutral value (0.0, or 50.0 for the percentile) when the window
//! is too short instead of failing.

use super::stats::{mean, ols_slope, sample_std};
use crate::ports::Ohlcv;

/// Bars used for the EMA slope regression
const SLOPE_LOOKBACK: usize = 10;

fn true_ranges(bars: &[Ohlcv]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    bars.iter()
        .map(|bar| {
            let hl = bar.high - bar.low;
            let tr = match prev_close {
                Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
                None => hl,
            };
            prev_close = Some(bar.close);
            tr
        })
        .collect()
}

/// Simple mean of the last `period` true ranges
pub fn atr(bars: &[Ohlcv], period: usize) -> f64 {
    if period == 0 || bars.len() < period {
        return 0.0;
    }
    let trs = true_ranges(bars);
    mean(&trs[trs.len() - period..]).unwrap_or(0.0)
}

/// Bollinger width (upper - lower) as a percentage of the middle band, 2 std
pub fn bollinger_width_pct(closes: &[f64], period: usize) -> f64 {
    if period < 2 || closes.len() < period {
        return 0.0;
    }
    let window = &closes[closes.len() - period..];
    match (mean(window), sample_std(window)) {
        (Some(sma), Some(std)) if sma != 0.0 => 4.0 * std / sma * 100.0,
        _ => 0.0,
    }
}

/// Share (0-100) of historical `period`-bar ATRs strictly below the current ATR
pub fn volatility_percentile(bars: &[Ohlcv], period: usize) -> f64 {
    if period == 0 || bars.len() <= period {
        return 50.0;
    }
    let current = atr(bars, period);
    let history: Vec<f64> = (0..bars.len() - period)
        .map(|i| atr(&bars[i..i + period], period))
        .collect();
    let below = history.iter().filter(|&&a| a < current).count();
    below as f64 / history.len() as f64 * 100.0
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded on the first close
pub fn ema(closes: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(closes.len());
    let mut prev: Option<f64> = None;
    for &c in closes {
        let next = match prev {
            Some(p) => alpha * c + (1.0 - alpha) * p,
            None => c,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Least-squares slope of the last ten EMA values, in price units per bar
pub fn ema_slope(closes: &[f64], period: usize) -> f64 {
    let series = ema(closes, period);
    if series.len() < SLOPE_LOOKBACK {
        return 0.0;
    }
    let recent = &series[series.len() - SLOPE_LOOKBACK..];
    let xs: Vec<f64> = (0..SLOPE_LOOKBACK).map(|i| i as f64).collect();
    ols_slope(&xs, recent).unwrap_or(0.0)
}
