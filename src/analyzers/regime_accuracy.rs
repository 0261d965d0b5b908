//! Regime Accuracy Analyzer
//!
//! Used by the deep report only. Each trade is matched to the market
//! snapshot of the same symbol nearest its open time; if the classifier is
//! any good, trades opened in ranging conditions should win more often than
//! trades opened in trending ones, and blocked recoveries should mostly have
//! protected positions that went on to lose.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::recovery::BlockStats;
use super::{ensure_finite, AnalyzerError, BucketStats};
use crate::domain::{nearest_by_timestamp, MarketRegime, MarketSnapshot, TradeRecord};

const MIN_BUCKET_TRADES: usize = 5;
const MIN_RESOLVED_BLOCKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangingVerdict {
    Excellent,
    Good,
    Poor,
}

/// Trending trades are expected to win less; a high win rate there means
/// the classifier is flagging trends that are not hurting the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendingVerdict {
    Excellent,
    Acceptable,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockVerdict {
    Excellent,
    Acceptable,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAccuracy {
    pub trades_analyzed: usize,
    /// Trades that found a snapshot within the join tolerance
    pub matched_to_snapshot: usize,
    pub ranging: BucketStats,
    pub choppy: BucketStats,
    pub trending: BucketStats,
    pub ranging_verdict: Option<RangingVerdict>,
    pub trending_verdict: Option<TrendingVerdict>,
    /// `None` unless both buckets have trades
    pub ranging_outperforms: Option<bool>,
    /// Trades opened while the snapshot said recovery was safe / unsafe
    pub recovery_safe: BucketStats,
    pub recovery_unsafe: BucketStats,
    pub blocks: BlockStats,
    pub block_accuracy: Option<f64>,
    pub block_verdict: Option<BlockVerdict>,
}

#[derive(Debug, Clone)]
pub struct RegimeAccuracyAnalyzer {
    tolerance: Duration,
}

impl Default for RegimeAccuracyAnalyzer {
    fn default() -> Self {
        Self::new(Duration::minutes(120))
    }
}

impl RegimeAccuracyAnalyzer {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn analyze(
        &self,
        trades: &[TradeRecord],
        snapshots: &[MarketSnapshot],
        blocks: &BlockStats,
    ) -> Result<RegimeAccuracy, AnalyzerError> {
        for t in trades {
            ensure_finite("profit", t.ticket, t.profit)?;
        }

        let mut by_symbol: HashMap<&str, Vec<&MarketSnapshot>> = HashMap::new();
        for s in snapshots {
            by_symbol.entry(s.symbol.as_str()).or_default().push(s);
        }

        let mut acc = RegimeAccuracy {
            trades_analyzed: trades.len(),
            matched_to_snapshot: 0,
            ranging: BucketStats::default(),
            choppy: BucketStats::default(),
            trending: BucketStats::default(),
            ranging_verdict: None,
            trending_verdict: None,
            ranging_outperforms: None,
            recovery_safe: BucketStats::default(),
            recovery_unsafe: BucketStats::default(),
            blocks: blocks.clone(),
            block_accuracy: blocks.accuracy(),
            block_verdict: None,
        };

        for t in trades {
            let snapshot = by_symbol.get(t.symbol.as_str()).and_then(|candidates| {
                nearest_by_timestamp(t.open_time, candidates, |s| s.timestamp, self.tolerance)
            });
            let regime = match snapshot {
                Some(s) => {
                    acc.matched_to_snapshot += 1;
                    if s.recovery_safe {
                        acc.recovery_safe.record(t.profit);
                    } else {
                        acc.recovery_unsafe.record(t.profit);
                    }
                    s.regime
                }
                None => t.market_regime,
            };
            match regime {
                MarketRegime::Ranging => acc.ranging.record(t.profit),
                MarketRegime::Choppy => acc.choppy.record(t.profit),
                r if r.is_trending() => acc.trending.record(t.profit),
                _ => {}
            }
        }

        if acc.ranging.trades >= MIN_BUCKET_TRADES {
            let wr = acc.ranging.win_rate;
            acc.ranging_verdict = Some(if wr >= 65.0 {
                RangingVerdict::Excellent
            } else if wr >= 55.0 {
                RangingVerdict::Good
            } else {
                RangingVerdict::Poor
            });
        }
        if acc.trending.trades >= MIN_BUCKET_TRADES {
            let wr = acc.trending.win_rate;
            acc.trending_verdict = Some(if wr <= 40.0 {
                TrendingVerdict::Excellent
            } else if wr <= 55.0 {
                TrendingVerdict::Acceptable
            } else {
                TrendingVerdict::Warning
            });
        }
        if acc.ranging.trades > 0 && acc.trending.trades > 0 {
            acc.ranging_outperforms = Some(acc.ranging.win_rate > acc.trending.win_rate);
        }
        if blocks.resolved() >= MIN_RESOLVED_BLOCKS {
            acc.block_verdict = blocks.accuracy().map(|a| {
                if a >= 70.0 {
                    BlockVerdict::Excellent
                } else if a >= 50.0 {
                    BlockVerdict::Acceptable
                } else {
                    BlockVerdict::Poor
                }
            });
        }

        Ok(acc)
    }
}
