//! Regime Threshold Optimizer
//!
//! Report-only. Replays closed trades against the Hurst/VHF/ADX readings of
//! the snapshot nearest each open time and sweeps threshold grids to find the
//! cut-offs that best separate winning (ranging) entries from losing
//! (trending) ones. Nothing here changes the live classifier; the result is
//! a suggestion for the operator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_finite, AnalyzerError, BucketStats};
use crate::domain::{nearest_by_timestamp, MarketSnapshot, TradeRecord};

/// Bucket size below which a side contributes nothing to the score
const MIN_BUCKET_TRADES: usize = 5;
/// ADX must clear the ranging threshold by this much to count as trending
const ADX_TREND_GAP: f64 = 5.0;

const HURST_RANGING: [f64; 5] = [0.40, 0.42, 0.45, 0.47, 0.50];
const HURST_TRENDING: [f64; 5] = [0.50, 0.52, 0.55, 0.57, 0.60];
const VHF_RANGING: [f64; 5] = [0.20, 0.23, 0.25, 0.27, 0.30];
const VHF_TRENDING: [f64; 5] = [0.35, 0.38, 0.40, 0.42, 0.45];
const ADX_THRESHOLDS: [f64; 7] = [15.0, 18.0, 20.0, 22.0, 25.0, 28.0, 30.0];

const COMBINED_HURST_RANGING: [f64; 3] = [0.45, 0.47, 0.50];
const COMBINED_HURST_TRENDING: [f64; 3] = [0.52, 0.55, 0.57];
const COMBINED_VHF_RANGING: [f64; 3] = [0.25, 0.27, 0.30];
const COMBINED_VHF_TRENDING: [f64; 3] = [0.38, 0.40, 0.42];

/// (hurst ranging, hurst trending, vhf ranging, vhf trending, adx ranging, adx trending)
const TRIPLE_CONFIGS: [(f64, f64, f64, f64, f64, f64); 7] = [
    (0.45, 0.55, 0.25, 0.40, 20.0, 25.0),
    (0.47, 0.53, 0.27, 0.38, 18.0, 28.0),
    (0.48, 0.52, 0.28, 0.37, 20.0, 25.0),
    (0.45, 0.55, 0.30, 0.40, 22.0, 27.0),
    (0.47, 0.55, 0.25, 0.42, 20.0, 30.0),
    (0.50, 0.55, 0.28, 0.40, 20.0, 25.0),
    (0.45, 0.52, 0.25, 0.38, 18.0, 25.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerMethod {
    HurstOnly,
    VhfOnly,
    AdxOnly,
    HurstVhf,
    HurstVhfAdx,
}

impl OptimizerMethod {
    pub const ALL: [OptimizerMethod; 5] = [
        OptimizerMethod::HurstOnly,
        OptimizerMethod::VhfOnly,
        OptimizerMethod::AdxOnly,
        OptimizerMethod::HurstVhf,
        OptimizerMethod::HurstVhfAdx,
    ];
}

impl fmt::Display for OptimizerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizerMethod::HurstOnly => "hurst",
            OptimizerMethod::VhfOnly => "vhf",
            OptimizerMethod::AdxOnly => "adx",
            OptimizerMethod::HurstVhf => "hurst+vhf",
            OptimizerMethod::HurstVhfAdx => "hurst+vhf+adx",
        };
        write!(f, "{}", s)
    }
}

/// Cut-offs of one candidate. Indicators the method ignores stay `None`.
///
/// Ranging requires every set indicator below its ranging cut-off; trending
/// fires when any set indicator is above its trending cut-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub hurst_ranging: Option<f64>,
    pub hurst_trending: Option<f64>,
    pub vhf_ranging: Option<f64>,
    pub vhf_trending: Option<f64>,
    pub adx_ranging: Option<f64>,
    pub adx_trending: Option<f64>,
}

impl RegimeThresholds {
    fn is_ranging(&self, r: &Readings) -> bool {
        below(r.hurst, self.hurst_ranging) && below(r.vhf, self.vhf_ranging) && below(r.adx, self.adx_ranging)
    }

    fn is_trending(&self, r: &Readings) -> bool {
        above(r.hurst, self.hurst_trending) || above(r.vhf, self.vhf_trending) || above(r.adx, self.adx_trending)
    }
}

impl fmt::Display for RegimeThresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let pairs = [
            ("H", self.hurst_ranging, self.hurst_trending, 2usize),
            ("VHF", self.vhf_ranging, self.vhf_trending, 2),
            ("ADX", self.adx_ranging, self.adx_trending, 0),
        ];
        for (name, ranging, trending, precision) in pairs {
            if let (Some(r), Some(t)) = (ranging, trending) {
                parts.push(format!("{name}<{r:.precision$}/>{t:.precision$}"));
            }
        }
        write!(f, "{}", parts.join(" "))
    }
}

fn below(value: f64, cut: Option<f64>) -> bool {
    cut.map_or(true, |c| value < c)
}

fn above(value: f64, cut: Option<f64>) -> bool {
    cut.map_or(false, |c| value > c)
}

#[derive(Debug, Clone, Copy)]
struct Readings {
    hurst: f64,
    vhf: f64,
    adx: f64,
    profit: f64,
}

/// Score of one threshold candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCandidate {
    pub method: OptimizerMethod,
    pub thresholds: RegimeThresholds,
    pub ranging: BucketStats,
    pub trending: BucketStats,
    /// Ranging win rate plus trending loss rate, each counted only when its
    /// bucket holds enough trades (0-200)
    pub score: f64,
    /// Percent of matched trades classified as ranging or trending
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOptimization {
    pub trades_analyzed: usize,
    /// Trades matched to a snapshot carrying Hurst and VHF readings
    pub trades_matched: usize,
    pub insufficient_data: bool,
    /// Highest-scoring candidate of each method, in `OptimizerMethod::ALL` order
    pub best_by_method: Vec<ThresholdCandidate>,
    pub best: Option<ThresholdCandidate>,
}

#[derive(Debug, Clone)]
pub struct RegimeThresholdOptimizer {
    tolerance: Duration,
    min_trades: usize,
}

impl Default for RegimeThresholdOptimizer {
    fn default() -> Self {
        Self::new(Duration::minutes(120), 10)
    }
}

impl RegimeThresholdOptimizer {
    pub fn new(tolerance: Duration, min_trades: usize) -> Self {
        Self { tolerance, min_trades }
    }

    pub fn optimize(
        &self,
        trades: &[TradeRecord],
        snapshots: &[MarketSnapshot],
    ) -> Result<ThresholdOptimization, AnalyzerError> {
        for t in trades {
            ensure_finite("profit", t.ticket, t.profit)?;
        }
        let readings = self.match_readings(trades, snapshots);

        let mut result = ThresholdOptimization {
            trades_analyzed: trades.len(),
            trades_matched: readings.len(),
            insufficient_data: readings.len() < self.min_trades,
            best_by_method: Vec::new(),
            best: None,
        };
        if result.insufficient_data {
            debug!(
                matched = readings.len(),
                min_trades = self.min_trades,
                "Too few matched trades for threshold optimization"
            );
            return Ok(result);
        }

        for method in OptimizerMethod::ALL {
            let best = candidates(method)
                .into_iter()
                .map(|thresholds| evaluate(method, thresholds, &readings))
                .fold(None, pick_better);
            if let Some(best) = best {
                result.best_by_method.push(best);
            }
        }
        result.best = result
            .best_by_method
            .iter()
            .cloned()
            .fold(None, pick_better)
            .filter(|c| c.score > 0.0);
        Ok(result)
    }

    fn match_readings(&self, trades: &[TradeRecord], snapshots: &[MarketSnapshot]) -> Vec<Readings> {
        let mut by_symbol: HashMap<&str, Vec<&MarketSnapshot>> = HashMap::new();
        for s in snapshots {
            by_symbol.entry(s.symbol.as_str()).or_default().push(s);
        }
        trades
            .iter()
            .filter_map(|t| {
                let candidates = by_symbol.get(t.symbol.as_str())?;
                let s = nearest_by_timestamp(t.open_time, candidates, |s| s.timestamp, self.tolerance)?;
                Some(Readings {
                    hurst: s.hurst?,
                    vhf: s.vhf?,
                    adx: s.adx,
                    profit: t.profit,
                })
            })
            .collect()
    }
}

/// Keeps the earlier candidate on equal scores
fn pick_better(best: Option<ThresholdCandidate>, next: ThresholdCandidate) -> Option<ThresholdCandidate> {
    match best {
        Some(b) if b.score.partial_cmp(&next.score) != Some(Ordering::Less) => Some(b),
        _ => Some(next),
    }
}

fn evaluate(method: OptimizerMethod, thresholds: RegimeThresholds, readings: &[Readings]) -> ThresholdCandidate {
    let mut ranging = BucketStats::default();
    let mut trending = BucketStats::default();
    for r in readings {
        if thresholds.is_ranging(r) {
            ranging.record(r.profit);
        } else if thresholds.is_trending(r) {
            trending.record(r.profit);
        }
    }

    let mut score = 0.0;
    if ranging.trades >= MIN_BUCKET_TRADES {
        score += ranging.win_rate;
    }
    if trending.trades >= MIN_BUCKET_TRADES {
        score += 100.0 - trending.win_rate;
    }
    let coverage = super::percent(ranging.trades + trending.trades, readings.len());

    ThresholdCandidate {
        method,
        thresholds,
        ranging,
        trending,
        score,
        coverage,
    }
}

fn candidates(method: OptimizerMethod) -> Vec<RegimeThresholds> {
    let mut out = Vec::new();
    match method {
        OptimizerMethod::HurstOnly => {
            for r in HURST_RANGING {
                for t in HURST_TRENDING.into_iter().filter(|t| r < *t) {
                    out.push(RegimeThresholds {
                        hurst_ranging: Some(r),
                        hurst_trending: Some(t),
                        ..Default::default()
                    });
                }
            }
        }
        OptimizerMethod::VhfOnly => {
            for r in VHF_RANGING {
                for t in VHF_TRENDING {
                    out.push(RegimeThresholds {
                        vhf_ranging: Some(r),
                        vhf_trending: Some(t),
                        ..Default::default()
                    });
                }
            }
        }
        OptimizerMethod::AdxOnly => {
            for a in ADX_THRESHOLDS {
                out.push(RegimeThresholds {
                    adx_ranging: Some(a),
                    adx_trending: Some(a + ADX_TREND_GAP),
                    ..Default::default()
                });
            }
        }
        OptimizerMethod::HurstVhf => {
            for hr in COMBINED_HURST_RANGING {
                for ht in COMBINED_HURST_TRENDING {
                    for vr in COMBINED_VHF_RANGING {
                        for vt in COMBINED_VHF_TRENDING {
                            out.push(RegimeThresholds {
                                hurst_ranging: Some(hr),
                                hurst_trending: Some(ht),
                                vhf_ranging: Some(vr),
                                vhf_trending: Some(vt),
                                ..Default::default()
                            });
                        }
                    }
                }
            }
        }
        OptimizerMethod::HurstVhfAdx => {
            for (hr, ht, vr, vt, ar, at) in TRIPLE_CONFIGS {
                out.push(RegimeThresholds {
                    hurst_ranging: Some(hr),
                    hurst_trending: Some(ht),
                    vhf_ranging: Some(vr),
                    vhf_trending: Some(vt),
                    adx_ranging: Some(ar),
                    adx_trending: Some(at),
                });
            }
        }
    }
    out
}
