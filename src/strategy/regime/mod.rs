//! Market Regime Detection Module
//!
//! Classifies a price window into a discrete regime and decides whether
//! averaging-style recovery is safe to run.
//!
//! - **ADX**: Wilder trend strength, bucketed ranging/choppy/trending
//! - **Hurst**: rescaled-range persistence estimate
//! - **VHF**: vertical-horizontal filter and its three-window trend
//! - **Volatility**: ATR, Bollinger width, ATR percentile, EMA slope
//! - **Classifier**: combines the above into a `MarketSnapshot`

pub mod adx;
pub mod classifier;
pub mod hurst;
pub mod vhf;
pub mod volatility;

pub use adx::{AdxResult, WilderAdx};
pub use classifier::{
    recovery_safety, statistical_regime, IndicatorReadings, RegimeClassifier, RegimeConfig,
};
pub use hurst::hurst_exponent;
pub use vhf::{vhf, vhf_trend};
pub use volatility::{atr, bollinger_width_pct, ema_slope, volatility_percentile};

/// Small numeric helpers shared by the indicators
pub(crate) mod stats {
    use statrs::statistics::Statistics;

    /// Arithmetic mean, `None` for an empty slice
    pub fn mean(xs: &[f64]) -> Option<f64> {
        if xs.is_empty() {
            return None;
        }
        Some(Statistics::mean(xs.iter()))
    }

    /// Sample standard deviation (n - 1), `None` below two samples
    pub fn sample_std(xs: &[f64]) -> Option<f64> {
        if xs.len() < 2 {
            return None;
        }
        Some(Statistics::std_dev(xs.iter()))
    }

    /// Least-squares slope of `ys` against `xs`
    pub fn ols_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }
        let mx = mean(xs)?;
        let my = mean(ys)?;
        let mut num = 0.0;
        let mut den = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            num += (x - mx) * (y - my);
            den += (x - mx) * (x - mx);
        }
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    }

}

/// Bar fixtures for indicator tests
#[cfg(test)]
pub(crate) mod test_bars {
    use crate::ports::Ohlcv;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly bars whose body spans the previous and current close, padded 0.2
    pub fn bars_from_closes(closes: &[f64]) -> Vec<Ohlcv> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut prev = closes.first().copied().unwrap_or(0.0);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let bar = Ohlcv {
                    timestamp: start + Duration::hours(i as i64),
                    open: prev,
                    high: prev.max(close) + 0.2,
                    low: prev.min(close) - 0.2,
                    close,
                    volume: 1000.0,
                };
                prev = close;
                bar
            })
            .collect()
    }

    pub fn linear(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    /// Alternates `base` and `base + amplitude`
    pub fn zigzag(base: f64, amplitude: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { base } else { base + amplitude })
            .collect()
    }
}
