//! Recovery Analyzer
//!
//! Measures how well each loss-recovery mechanism (grid, hedge, DCA) works.
//! An action counts as successful once its stack closed in profit: either the
//! store already resolved its `recovered` flag, or a trade with the action's
//! ticket or parent ticket is present in the supplied trades.
//!
//! Blocked actions (recoveries the regime gate refused) are kept out of the
//! per-type and stack metrics and scored separately: a block is justified
//! when the position it protected still closed at a loss.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ensure_finite, percent, AnalysisConfig, AnalyzerError};
use crate::domain::{RecoveryAction, RecoveryKind, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryVerdict {
    Keep,
    Good,
    Tune,
    ConsiderDisabling,
    InsufficientData,
}

impl RecoveryVerdict {
    pub fn from_rate(success_rate: f64, samples: usize, min_samples: usize) -> Self {
        if samples == 0 || samples < min_samples {
            Self::InsufficientData
        } else if success_rate >= 70.0 {
            Self::Keep
        } else if success_rate >= 55.0 {
            Self::Good
        } else if success_rate >= 40.0 {
            Self::Tune
        } else {
            Self::ConsiderDisabling
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTypeStats {
    pub triggered: usize,
    pub successful: usize,
    pub failed: usize,
    /// Stack not yet closed
    pub pending: usize,
    /// successful / triggered, percent
    pub success_rate: f64,
    pub avg_level: f64,
    pub max_level: u32,
    pub avg_cost: f64,
    pub avg_duration_minutes: f64,
    pub verdict: RecoveryVerdict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackStats {
    pub stacks: usize,
    /// Mean over stacks of the worst drawdown magnitude seen in the stack
    pub avg_max_drawdown: f64,
    /// Mean over stacks of the largest cumulative volume
    pub avg_max_volume: f64,
    pub avg_actions_per_stack: f64,
    pub worst_drawdown: f64,
    pub max_volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStats {
    pub total: usize,
    /// Blocked position closed at a loss
    pub justified: usize,
    /// Blocked position closed in profit anyway
    pub false_positives: usize,
    pub unresolved: usize,
}

impl BlockStats {
    pub fn resolved(&self) -> usize {
        self.justified + self.false_positives
    }

    /// Share of resolved blocks that were justified, `None` with nothing resolved
    pub fn accuracy(&self) -> Option<f64> {
        let resolved = self.resolved();
        (resolved > 0).then(|| percent(self.justified, resolved))
    }
}

/// Stored reference statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub drawdown: BaselineStat,
    pub volume: BaselineStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineStat {
    pub mean: f64,
}

#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("Failed to read baseline file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse baseline JSON: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl Baseline {
    /// Load a baseline JSON file, `Ok(None)` if the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>, BaselineError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let baseline = serde_json::from_str(&content)?;
        Ok(Some(baseline))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Worsening,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_drawdown: f64,
    pub current_drawdown: f64,
    /// Positive means a deeper drawdown than baseline
    pub drawdown_change_pct: f64,
    pub drawdown_trend: Trend,
    pub baseline_volume: f64,
    pub current_volume: f64,
    pub volume_change_pct: f64,
    pub volume_trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPatternKind {
    HighEffectiveness,
    LowEffectiveness,
    HighRecoveryDepth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPattern {
    pub kind: RecoveryPatternKind,
    pub recovery_kind: RecoveryKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    /// Always holds grid, hedge and dca
    pub by_kind: BTreeMap<RecoveryKind, RecoveryTypeStats>,
    pub stacks: StackStats,
    pub blocks: BlockStats,
    pub baseline: Option<BaselineComparison>,
    pub patterns: Vec<RecoveryPattern>,
}

impl RecoveryMetrics {
    pub fn kind(&self, kind: RecoveryKind) -> Option<&RecoveryTypeStats> {
        self.by_kind.get(&kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryAnalyzer {
    config: AnalysisConfig,
}

/// Outcome of one action after correlating with trades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Recovered,
    Failed,
    Pending,
}

impl RecoveryAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        actions: &[RecoveryAction],
        trades: &[TradeRecord],
        baseline: Option<&Baseline>,
    ) -> Result<RecoveryMetrics, AnalyzerError> {
        for a in actions {
            ensure_finite("cost", a.ticket, a.cost)?;
            ensure_finite("drawdown", a.ticket, a.drawdown)?;
            ensure_finite("volume", a.ticket, a.total_volume)?;
            ensure_finite("duration", a.ticket, a.duration_minutes)?;
        }

        let closed: HashMap<u64, f64> = trades.iter().map(|t| (t.ticket, t.profit)).collect();
        let outcome = |a: &RecoveryAction| -> Outcome {
            let recovered = a.recovered.or_else(|| {
                closed
                    .get(&a.ticket)
                    .or_else(|| closed.get(&a.parent_ticket))
                    .map(|profit| *profit > 0.0)
            });
            match recovered {
                Some(true) => Outcome::Recovered,
                Some(false) => Outcome::Failed,
                None => Outcome::Pending,
            }
        };

        let mut by_kind = BTreeMap::new();
        for kind in RecoveryKind::MECHANISMS {
            let of_kind: Vec<&RecoveryAction> = actions.iter().filter(|a| a.kind == kind).collect();
            by_kind.insert(kind, self.type_stats(&of_kind, &outcome));
        }

        let mechanisms: Vec<&RecoveryAction> =
            actions.iter().filter(|a| a.kind != RecoveryKind::Blocked).collect();
        let stacks = stack_stats(&mechanisms);

        let mut blocks = BlockStats::default();
        for a in actions.iter().filter(|a| a.kind == RecoveryKind::Blocked) {
            blocks.total += 1;
            match outcome(a) {
                Outcome::Failed => blocks.justified += 1,
                Outcome::Recovered => blocks.false_positives += 1,
                Outcome::Pending => blocks.unresolved += 1,
            }
        }

        let baseline = baseline
            .filter(|_| stacks.stacks > 0)
            .map(|b| compare_with_baseline(&stacks, b));
        let patterns = self.patterns(&by_kind);

        Ok(RecoveryMetrics {
            by_kind,
            stacks,
            blocks,
            baseline,
            patterns,
        })
    }

    fn type_stats<F>(&self, actions: &[&RecoveryAction], outcome: &F) -> RecoveryTypeStats
    where
        F: Fn(&RecoveryAction) -> Outcome,
    {
        let n = actions.len();
        let mut successful = 0;
        let mut failed = 0;
        let mut pending = 0;
        for a in actions {
            match outcome(a) {
                Outcome::Recovered => successful += 1,
                Outcome::Failed => failed += 1,
                Outcome::Pending => pending += 1,
            }
        }
        let avg = |f: fn(&RecoveryAction) -> f64| {
            if n == 0 {
                0.0
            } else {
                actions.iter().map(|a| f(a)).sum::<f64>() / n as f64
            }
        };
        let success_rate = percent(successful, n);

        RecoveryTypeStats {
            triggered: n,
            successful,
            failed,
            pending,
            success_rate,
            avg_level: avg(|a| f64::from(a.level)),
            max_level: actions.iter().map(|a| a.level).fold(0, u32::max),
            avg_cost: avg(|a| a.cost),
            avg_duration_minutes: avg(|a| a.duration_minutes),
            verdict: RecoveryVerdict::from_rate(success_rate, n, self.config.min_recovery_samples),
        }
    }

    fn patterns(&self, by_kind: &BTreeMap<RecoveryKind, RecoveryTypeStats>) -> Vec<RecoveryPattern> {
        let mut patterns = Vec::new();
        for (kind, stats) in by_kind {
            if stats.triggered < self.config.min_pattern_trades {
                continue;
            }
            if stats.success_rate > 80.0 {
                patterns.push(RecoveryPattern {
                    kind: RecoveryPatternKind::HighEffectiveness,
                    recovery_kind: *kind,
                    message: format!("{kind} recovery is highly effective ({:.1}%)", stats.success_rate),
                });
            } else if stats.success_rate < 50.0 {
                patterns.push(RecoveryPattern {
                    kind: RecoveryPatternKind::LowEffectiveness,
                    recovery_kind: *kind,
                    message: format!("{kind} recovery success rate is low ({:.1}%)", stats.success_rate),
                });
            }
            if stats.avg_level > 4.0 {
                patterns.push(RecoveryPattern {
                    kind: RecoveryPatternKind::HighRecoveryDepth,
                    recovery_kind: *kind,
                    message: format!("{kind} stacks run deep (average level {:.1})", stats.avg_level),
                });
            }
        }
        patterns
    }
}

fn stack_stats(actions: &[&RecoveryAction]) -> StackStats {
    let mut groups: BTreeMap<u64, Vec<&RecoveryAction>> = BTreeMap::new();
    for a in actions {
        groups.entry(a.parent_ticket).or_default().push(a);
    }
    if groups.is_empty() {
        return StackStats::default();
    }

    let n = groups.len() as f64;
    let mut stats = StackStats {
        stacks: groups.len(),
        ..Default::default()
    };
    let mut sum_dd = 0.0;
    let mut sum_vol = 0.0;
    let mut sum_actions = 0.0;
    for group in groups.values() {
        let dd = group.iter().map(|a| a.drawdown.abs()).fold(0.0, f64::max);
        let vol = group.iter().map(|a| a.total_volume).fold(0.0, f64::max);
        sum_dd += dd;
        sum_vol += vol;
        sum_actions += group.len() as f64;
        stats.worst_drawdown = stats.worst_drawdown.max(dd);
        stats.max_volume = stats.max_volume.max(vol);
    }
    stats.avg_max_drawdown = sum_dd / n;
    stats.avg_max_volume = sum_vol / n;
    stats.avg_actions_per_stack = sum_actions / n;
    stats
}

fn change_pct(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (current - baseline) / baseline * 100.0
    }
}

fn compare_with_baseline(stacks: &StackStats, baseline: &Baseline) -> BaselineComparison {
    let base_dd = baseline.drawdown.mean.abs();
    let base_vol = baseline.volume.mean.abs();
    let dd_change = change_pct(stacks.avg_max_drawdown, base_dd);
    let vol_change = change_pct(stacks.avg_max_volume, base_vol);
    let trend = |change: f64| if change > 0.0 { Trend::Worsening } else { Trend::Improving };

    BaselineComparison {
        baseline_drawdown: base_dd,
        current_drawdown: stacks.avg_max_drawdown,
        drawdown_change_pct: dd_change,
        drawdown_trend: trend(dd_change),
        baseline_volume: base_vol,
        current_volume: stacks.avg_max_volume,
        volume_change_pct: vol_change,
        volume_trend: trend(vol_change),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{action, trade};
    use crate::domain::MarketRegime;
    use approx::assert_relative_eq;

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(RecoveryVerdict::from_rate(70.0, 10, 3), RecoveryVerdict::Keep);
        assert_eq!(RecoveryVerdict::from_rate(69.9, 10, 3), RecoveryVerdict::Good);
        assert_eq!(RecoveryVerdict::from_rate(55.0, 10, 3), RecoveryVerdict::Good);
        assert_eq!(RecoveryVerdict::from_rate(40.0, 10, 3), RecoveryVerdict::Tune);
        assert_eq!(RecoveryVerdict::from_rate(39.9, 10, 3), RecoveryVerdict::ConsiderDisabling);
        assert_eq!(RecoveryVerdict::from_rate(0.0, 2, 3), RecoveryVerdict::InsufficientData);
        assert_eq!(RecoveryVerdict::from_rate(0.0, 0, 0), RecoveryVerdict::InsufficientData);
    }

    #[test]
    fn test_zero_triggers_are_insufficient_not_poor() {
        let m = RecoveryAnalyzer::default().analyze(&[], &[], None).unwrap();
        for kind in RecoveryKind::MECHANISMS {
            let stats = m.kind(kind).unwrap();
            assert_eq!(stats.triggered, 0);
            assert_eq!(stats.success_rate, 0.0);
            assert_eq!(stats.verdict, RecoveryVerdict::InsufficientData);
        }
        assert_eq!(m.stacks.stacks, 0);
        assert!(m.baseline.is_none());
    }

    #[test]
    fn test_resolution_by_trade_ticket_and_stored_flag() {
        let mut stored = action(RecoveryKind::Grid, 21, 20, 1);
        stored.recovered = Some(false);
        let actions = vec![
            action(RecoveryKind::Dca, 11, 10, 1),
            action(RecoveryKind::Dca, 12, 10, 2),
            action(RecoveryKind::Dca, 31, 30, 1),
            stored,
        ];
        let trades = vec![trade(10, 25.0, MarketRegime::Ranging)];
        let m = RecoveryAnalyzer::default().analyze(&actions, &trades, None).unwrap();

        let dca = m.kind(RecoveryKind::Dca).unwrap();
        assert_eq!(dca.triggered, 3);
        assert_eq!(dca.successful, 2);
        assert_eq!(dca.pending, 1);
        assert_relative_eq!(dca.success_rate, 200.0 / 3.0, epsilon = 1e-9);
        assert_eq!(dca.verdict, RecoveryVerdict::Good);
        assert_eq!(dca.max_level, 2);

        let grid = m.kind(RecoveryKind::Grid).unwrap();
        assert_eq!(grid.failed, 1);
        assert_eq!(grid.verdict, RecoveryVerdict::InsufficientData);
    }

    #[test]
    fn test_stack_metrics_group_by_parent() {
        let actions = vec![
            action(RecoveryKind::Grid, 2, 1, 1),
            action(RecoveryKind::Grid, 3, 1, 2),
            action(RecoveryKind::Grid, 4, 1, 3),
            action(RecoveryKind::Hedge, 6, 5, 1),
        ];
        let m = RecoveryAnalyzer::default().analyze(&actions, &[], None).unwrap();
        assert_eq!(m.stacks.stacks, 2);
        // stack 1 worst drawdown 90, stack 5 worst 30
        assert_relative_eq!(m.stacks.avg_max_drawdown, 60.0);
        assert_relative_eq!(m.stacks.avg_actions_per_stack, 2.0);
        assert_relative_eq!(m.stacks.worst_drawdown, 90.0);
        assert_relative_eq!(m.stacks.avg_max_volume, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_blocks_are_scored_separately() {
        let actions = vec![
            action(RecoveryKind::Blocked, 40, 40, 1),
            action(RecoveryKind::Blocked, 41, 41, 1),
            action(RecoveryKind::Blocked, 42, 42, 1),
        ];
        let trades = vec![
            trade(40, -20.0, MarketRegime::TrendingUp),
            trade(41, 15.0, MarketRegime::TrendingUp),
        ];
        let m = RecoveryAnalyzer::default().analyze(&actions, &trades, None).unwrap();
        assert_eq!(m.blocks.total, 3);
        assert_eq!(m.blocks.justified, 1);
        assert_eq!(m.blocks.false_positives, 1);
        assert_eq!(m.blocks.unresolved, 1);
        assert_eq!(m.blocks.accuracy(), Some(50.0));
        assert_eq!(m.stacks.stacks, 0);
        assert!(m.by_kind.values().all(|s| s.triggered == 0));
    }

    #[test]
    fn test_baseline_comparison_trend() {
        let actions = vec![action(RecoveryKind::Dca, 2, 1, 2)];
        let baseline = Baseline {
            drawdown: BaselineStat { mean: -50.0 },
            volume: BaselineStat { mean: 0.4 },
        };
        let m = RecoveryAnalyzer::default().analyze(&actions, &[], Some(&baseline)).unwrap();
        let cmp = m.baseline.unwrap();
        assert_relative_eq!(cmp.drawdown_change_pct, 20.0);
        assert_eq!(cmp.drawdown_trend, Trend::Worsening);
        assert_relative_eq!(cmp.volume_change_pct, -50.0, epsilon = 1e-9);
        assert_eq!(cmp.volume_trend, Trend::Improving);
    }

    #[test]
    fn test_patterns_need_five_samples() {
        let mut actions = Vec::new();
        for i in 0..5 {
            let mut a = action(RecoveryKind::Hedge, 100 + i, 100 + i, 5);
            a.recovered = Some(i < 2);
            actions.push(a);
        }
        let m = RecoveryAnalyzer::default().analyze(&actions, &[], None).unwrap();
        let kinds: Vec<_> = m.patterns.iter().map(|p| p.kind).collect();
        assert!(kinds.contains(&RecoveryPatternKind::LowEffectiveness));
        assert!(kinds.contains(&RecoveryPatternKind::HighRecoveryDepth));
        assert!(m.patterns.iter().all(|p| p.recovery_kind == RecoveryKind::Hedge));
    }

    #[test]
    fn test_baseline_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Baseline::load(&dir.path().join("none.json")).unwrap().is_none());

        let path = dir.path().join("baseline.json");
        std::fs::write(&path, r#"{"drawdown":{"mean":-42.0},"volume":{"mean":0.3}}"#).unwrap();
        let b = Baseline::load(&path).unwrap().unwrap();
        assert_eq!(b.drawdown.mean, -42.0);
    }

    #[test]
    fn test_baseline_load_malformed_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, r#"{"drawdown":{"mean":"deep"}}"#).unwrap();
        let err = Baseline::load(&path).unwrap_err();
        assert!(matches!(err, BaselineError::ParseError(_)));
        assert!(err.to_string().starts_with("Failed to parse baseline JSON"));
    }
}
