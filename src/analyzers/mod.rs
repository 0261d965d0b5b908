//! Analyzers - Pure aggregations over stored records
//!
//! Each analyzer takes slices of records and returns a serializable metrics
//! struct. They never call each other; the orchestrator correlates their
//! output.
//!
//! - `PerformanceAnalyzer`: trade outcomes by regime and close hour
//! - `RecoveryAnalyzer`: grid/hedge/DCA effectiveness and stack depth
//! - `ConfluenceAnalyzer`: score buckets, factors and strategy modes
//! - `RegimeAccuracyAnalyzer`: whether regime tags predicted outcomes (report only)
//! - `RegimeThresholdOptimizer`: Hurst/VHF/ADX cut-off sweep (report only)

pub mod confluence;
pub mod performance;
pub mod recovery;
pub mod regime_accuracy;
pub mod regime_optimizer;

pub use confluence::{
    BreakoutAnalysis, ConfluenceAnalyzer, ConfluenceMetrics, ConfluencePattern, ConfluencePatternKind,
    FactorStack, FactorStats, FactorVerdict, HtfAnalysis, ScoreBucket, ScoreCorrelation,
    StrategyVerdict,
};
pub use performance::{PatternKind, PerformanceAnalyzer, PerformanceMetrics, PerformancePattern, Severity};
pub use recovery::{
    Baseline, BaselineComparison, BaselineError, BaselineStat, BlockStats, RecoveryAnalyzer,
    RecoveryMetrics, RecoveryPattern, RecoveryPatternKind, RecoveryTypeStats, RecoveryVerdict,
    StackStats, Trend,
};
pub use regime_accuracy::{
    BlockVerdict, RangingVerdict, RegimeAccuracy, RegimeAccuracyAnalyzer, TrendingVerdict,
};
pub use regime_optimizer::{
    OptimizerMethod, RegimeThresholdOptimizer, RegimeThresholds, ThresholdCandidate,
    ThresholdOptimization,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

/// Pattern and verdict thresholds shared by the analyzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Absolute loss beyond which a trade counts as a large loss
    pub large_loss_threshold: f64,
    /// Minimum trades in a regime bucket before win-rate patterns fire
    pub min_pattern_trades: usize,
    /// Minimum trades before a factor is ranked
    pub min_factor_trades: usize,
    pub factor_removal_win_rate: f64,
    pub factor_removal_min_trades: usize,
    /// Minimum triggers before a recovery verdict is emitted
    pub min_recovery_samples: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            large_loss_threshold: 50.0,
            min_pattern_trades: 5,
            min_factor_trades: 3,
            factor_removal_win_rate: 45.0,
            factor_removal_min_trades: 5,
            min_recovery_samples: 3,
        }
    }
}

/// Win/loss and profit totals for one bucket of trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent (0-100)
    pub win_rate: f64,
    pub total_profit: f64,
    pub avg_profit: f64,
}

impl BucketStats {
    pub fn record(&mut self, profit: f64) {
        self.trades += 1;
        if profit > 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.total_profit += profit;
        self.win_rate = percent(self.wins, self.trades);
        self.avg_profit = self.total_profit / self.trades as f64;
    }

    pub fn from_profits<I: IntoIterator<Item = f64>>(profits: I) -> Self {
        let mut stats = Self::default();
        for p in profits {
            stats.record(p);
        }
        stats
    }
}

/// `part / whole` as a percentage, 0 for an empty whole
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub(crate) fn ensure_finite(what: &str, id: u64, value: f64) -> Result<(), AnalyzerError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AnalyzerError::MalformedInput(format!("{what} of #{id} is {value}")))
    }
}
