//! Regime Classifier
//!
//! Combines the ADX bucket (discrete regime) with the Hurst/VHF statistical
//! regime and produces the recovery-safety verdict.
//!
//! The verdict depends only on Hurst and VHF: any trend signal (H above the
//! trending threshold, or VHF above its trending threshold) makes recovery
//! unsafe. A rising VHF without a crossed threshold is reported as a warning
//! in the reason but does not flip the verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::adx::WilderAdx;
use super::hurst::hurst_exponent;
use super::vhf::{vhf, vhf_trend};
use super::volatility::{atr, bollinger_width_pct, ema_slope, volatility_percentile};
use crate::domain::{MarketRegime, MarketSnapshot, StatisticalRegime, VhfTrend};
use crate::ports::Ohlcv;

/// Indicator periods and regime thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub adx_period: usize,
    pub ema_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub hurst_period: usize,
    pub vhf_period: usize,
    /// Shorter windows yield an `unknown` snapshot
    pub min_bars: usize,
    pub hurst_trending: f64,
    pub hurst_ranging: f64,
    pub vhf_trending: f64,
    pub vhf_ranging: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            adx_period: 14,
            ema_period: 50,
            atr_period: 14,
            bb_period: 20,
            hurst_period: 100,
            vhf_period: 28,
            min_bars: 150,
            hurst_trending: 0.55,
            hurst_ranging: 0.45,
            vhf_trending: 0.40,
            vhf_ranging: 0.25,
        }
    }
}

/// Raw indicator values for one window
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorReadings {
    pub adx: f64,
    pub ema_slope: f64,
    pub atr: f64,
    pub bb_width: f64,
    pub volatility_percentile: f64,
    pub hurst: Option<f64>,
    pub vhf: Option<f64>,
    pub vhf_trend: Option<VhfTrend>,
}

impl IndicatorReadings {
    /// Readings with neutral volatility, handy when only the regime inputs matter
    pub fn regime_only(adx: f64, ema_slope: f64, hurst: Option<f64>, vhf: Option<f64>) -> Self {
        Self {
            adx,
            ema_slope,
            atr: 0.0,
            bb_width: 0.0,
            volatility_percentile: 50.0,
            hurst,
            vhf,
            vhf_trend: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classify the window. Never fails: short or invalid windows yield a
    /// zero-confidence `unknown` snapshot.
    pub fn classify(&self, symbol: &str, bars: &[Ohlcv], now: DateTime<Utc>) -> MarketSnapshot {
        if bars.len() < self.config.min_bars {
            debug!(symbol, bars = bars.len(), min = self.config.min_bars, "Window too short for classification");
            return MarketSnapshot::unknown(
                symbol,
                now,
                format!("insufficient data: {} bars, need {}", bars.len(), self.config.min_bars),
            );
        }
        if let Some(bad) = bars.iter().position(|b| !b.is_valid()) {
            debug!(symbol, index = bad, "Invalid OHLC bar in window");
            return MarketSnapshot::unknown(symbol, now, format!("invalid bar at index {bad}"));
        }
        let readings = self.readings(bars);
        self.snapshot_from_readings(symbol, now, &readings)
    }

    /// Compute every indicator over the window
    pub fn readings(&self, bars: &[Ohlcv]) -> IndicatorReadings {
        let c = &self.config;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let adx = WilderAdx::compute(c.adx_period, bars);
        IndicatorReadings {
            adx: if adx.is_valid { adx.adx } else { f64::NAN },
            ema_slope: ema_slope(&closes, c.ema_period),
            atr: atr(bars, c.atr_period),
            bb_width: bollinger_width_pct(&closes, c.bb_period),
            volatility_percentile: volatility_percentile(bars, c.atr_period),
            hurst: hurst_exponent(&closes, c.hurst_period),
            vhf: vhf(&closes, c.vhf_period),
            vhf_trend: vhf_trend(&closes, c.vhf_period),
        }
    }

    /// Build the snapshot from already computed readings
    pub fn snapshot_from_readings(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        r: &IndicatorReadings,
    ) -> MarketSnapshot {
        let regime = MarketRegime::from_adx(r.adx, r.ema_slope);
        let (statistical, confidence, stat_reason) =
            statistical_regime(r.hurst, r.vhf, r.vhf_trend, &self.config);
        let (safe, reason) = recovery_safety(r.hurst, r.vhf, r.vhf_trend, &self.config);
        debug!(symbol, %regime, %statistical, confidence, safe, stat_reason = %stat_reason, "Classified window");

        MarketSnapshot {
            symbol: symbol.to_string(),
            timestamp,
            atr: r.atr,
            bb_width: r.bb_width,
            volatility_percentile: r.volatility_percentile,
            adx: if r.adx.is_finite() { r.adx } else { 0.0 },
            ema_slope: r.ema_slope,
            hurst: r.hurst,
            vhf: r.vhf,
            vhf_trend: r.vhf_trend,
            regime,
            statistical_regime: statistical,
            regime_confidence: confidence,
            recovery_safe: safe,
            recovery_reason: reason,
        }
    }
}

/// Statistical regime with confidence and a short explanation.
///
/// Without a Hurst estimate the decision falls back on VHF alone.
pub fn statistical_regime(
    hurst: Option<f64>,
    vhf: Option<f64>,
    trend: Option<VhfTrend>,
    c: &RegimeConfig,
) -> (StatisticalRegime, f64, String) {
    use StatisticalRegime::*;

    let Some(v) = vhf else {
        return (Unknown, 0.0, "insufficient data for VHF".to_string());
    };

    if trend == Some(VhfTrend::Rising) && v > c.vhf_ranging {
        return (Trending, 0.95, format!("VHF rising ({v:.3}), trend forming"));
    }

    let Some(h) = hurst else {
        return if v > c.vhf_trending {
            (Trending, 0.65, format!("VHF trending ({v:.3}), Hurst unavailable"))
        } else if v < c.vhf_ranging {
            (Ranging, 0.65, format!("VHF ranging ({v:.3}), Hurst unavailable"))
        } else {
            (Choppy, 0.50, format!("VHF transitional ({v:.3}), Hurst unavailable"))
        };
    };

    let h_trend = h > c.hurst_trending;
    let h_range = h < c.hurst_ranging;
    let v_trend = v > c.vhf_trending;
    let v_range = v < c.vhf_ranging;

    if h_trend && v_trend {
        (Trending, 0.90, format!("strong trend: H={h:.3}, VHF={v:.3}"))
    } else if h_range && v_range {
        (Ranging, 0.90, format!("strong range: H={h:.3}, VHF={v:.3}"))
    } else if h_trend && v_range {
        (Trending, 0.60, format!("Hurst trending ({h:.3}), VHF choppy ({v:.3})"))
    } else if v_trend && h_range {
        (Trending, 0.75, format!("VHF trending ({v:.3}), early trend signal"))
    } else if h_trend || v_trend {
        (Trending, 0.65, format!("moderate trend: H={h:.3}, VHF={v:.3}"))
    } else if h_range || v_range {
        (Ranging, 0.65, format!("moderate range: H={h:.3}, VHF={v:.3}"))
    } else {
        (Choppy, 0.50, format!("transitional: H={h:.3}, VHF={v:.3}"))
    }
}

/// Recovery-safety verdict and human readable reason
pub fn recovery_safety(
    hurst: Option<f64>,
    vhf: Option<f64>,
    trend: Option<VhfTrend>,
    c: &RegimeConfig,
) -> (bool, String) {
    if hurst.is_none() && vhf.is_none() {
        return (false, "insufficient data for Hurst/VHF".to_string());
    }

    let mut signals = Vec::new();
    if let Some(h) = hurst.filter(|h| *h > c.hurst_trending) {
        signals.push(format!("Hurst {h:.3} > {:.2}", c.hurst_trending));
    }
    if let Some(v) = vhf.filter(|v| *v > c.vhf_trending) {
        signals.push(format!("VHF {v:.3} > {:.2}", c.vhf_trending));
    }
    if !signals.is_empty() {
        return (false, format!("trend signal: {}", signals.join(", ")));
    }

    let fmt_opt = |x: Option<f64>| x.map_or_else(|| "n/a".to_string(), |x| format!("{x:.3}"));
    let mut reason = format!("no trend signal (H={}, VHF={})", fmt_opt(hurst), fmt_opt(vhf));
    if trend == Some(VhfTrend::Rising) {
        reason.push_str("; warning: VHF rising");
    }
    (true, reason)
}
