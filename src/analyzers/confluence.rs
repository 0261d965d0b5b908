//! Confluence Analyzer
//!
//! Checks whether the entry confluence score actually predicts outcomes.
//! Higher-score buckets should win more often; a falling win rate across
//! buckets means the scoring logic is rewarding the wrong conditions.
//!
//! Also ranks individual factors, finds the best-performing factor stacks,
//! splits results by strategy mode, and summarizes breakout and
//! higher-timeframe entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ensure_finite, AnalysisConfig, AnalyzerError, BucketStats, Severity};
use crate::domain::{StrategyMode, TradeRecord};
use crate::strategy::regime::stats::mean;

/// Minimum trades per strategy mode before it gets a verdict
const MIN_STRATEGY_TRADES: usize = 5;
/// Minimum trades sharing an identical factor set
const MIN_STACK_TRADES: usize = 3;
const TOP_STACKS: usize = 5;
/// Scored trades needed before score/factor patterns are reported
const MIN_PATTERN_SCORED: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScoreBucket {
    #[serde(rename = "4")]
    AtMostFour,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7+")]
    SevenPlus,
}

impl ScoreBucket {
    pub const ALL: [ScoreBucket; 4] = [Self::AtMostFour, Self::Five, Self::Six, Self::SevenPlus];

    pub fn from_score(score: u32) -> Self {
        match score {
            0..=4 => Self::AtMostFour,
            5 => Self::Five,
            6 => Self::Six,
            _ => Self::SevenPlus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AtMostFour => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::SevenPlus => "7+",
        }
    }
}

impl fmt::Display for ScoreBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCorrelation {
    /// Win rate strictly rises with score
    Excellent,
    /// Win rate strictly falls with score
    Inverted,
    Mixed,
    /// Fewer than two populated buckets
    InsufficientData,
}

impl ScoreCorrelation {
    /// Judge win rates of populated buckets, lowest score first
    pub fn from_win_rates(rates: &[f64]) -> Self {
        if rates.len() < 2 {
            return Self::InsufficientData;
        }
        if rates.windows(2).all(|w| w[1] > w[0]) {
            Self::Excellent
        } else if rates.windows(2).all(|w| w[1] < w[0]) {
            Self::Inverted
        } else {
            Self::Mixed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorVerdict {
    Excellent,
    Good,
    Neutral,
    Poor,
}

impl FactorVerdict {
    pub fn from_win_rate(win_rate: f64) -> Self {
        if win_rate >= 75.0 {
            Self::Excellent
        } else if win_rate >= 60.0 {
            Self::Good
        } else if win_rate >= 45.0 {
            Self::Neutral
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyVerdict {
    Excellent,
    Good,
    Marginal,
    Poor,
}

impl StrategyVerdict {
    pub fn from_win_rate(win_rate: f64) -> Self {
        if win_rate >= 70.0 {
            Self::Excellent
        } else if win_rate >= 55.0 {
            Self::Good
        } else if win_rate >= 40.0 {
            Self::Marginal
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorStats {
    pub factor: String,
    #[serde(flatten)]
    pub stats: BucketStats,
    pub verdict: FactorVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorStack {
    pub factors: Vec<String>,
    #[serde(flatten)]
    pub stats: BucketStats,
}

/// Scored trades that entered on a level break
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakoutAnalysis {
    #[serde(flatten)]
    pub stats: BucketStats,
    /// Mean over breakouts that reported at least one broken level
    pub avg_levels_broken: f64,
}

/// Scored trades with a non-zero higher-timeframe score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HtfAnalysis {
    #[serde(flatten)]
    pub stats: BucketStats,
    pub avg_htf_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfluencePatternKind {
    HighScoreUnderperforming,
    LowScoreOutperforming,
    DominantFactor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluencePattern {
    pub kind: ConfluencePatternKind,
    pub severity: Severity,
    /// Score bucket label or factor name
    pub subject: String,
    pub win_rate: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceMetrics {
    pub trades_with_confluence: usize,
    pub by_score: BTreeMap<ScoreBucket, BucketStats>,
    pub score_correlation: ScoreCorrelation,
    /// Factors with enough samples, best win rate first
    pub by_factor: Vec<FactorStats>,
    pub top_factor: Option<String>,
    pub removal_candidates: Vec<String>,
    pub top_stacks: Vec<FactorStack>,
    /// All trades in the window, scored or not
    pub by_strategy: BTreeMap<StrategyMode, BucketStats>,
    pub strategy_verdicts: BTreeMap<StrategyMode, StrategyVerdict>,
    pub strategy_comparison: Option<String>,
    #[serde(default)]
    pub breakout_analysis: BreakoutAnalysis,
    #[serde(default)]
    pub htf_analysis: HtfAnalysis,
    #[serde(default)]
    pub patterns: Vec<ConfluencePattern>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfluenceAnalyzer {
    config: AnalysisConfig,
}

impl ConfluenceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, trades: &[TradeRecord]) -> Result<ConfluenceMetrics, AnalyzerError> {
        for t in trades {
            ensure_finite("profit", t.ticket, t.profit)?;
        }

        let scored: Vec<&TradeRecord> = trades.iter().filter(|t| t.confluence.is_some()).collect();

        let mut by_score: BTreeMap<ScoreBucket, BucketStats> = BTreeMap::new();
        let mut factor_profits: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut stack_profits: BTreeMap<&BTreeSet<String>, Vec<f64>> = BTreeMap::new();
        for t in &scored {
            let Some(info) = t.confluence.as_ref() else { continue };
            by_score.entry(ScoreBucket::from_score(info.score)).or_default().record(t.profit);
            for factor in &info.factors {
                factor_profits.entry(factor.as_str()).or_default().push(t.profit);
            }
            if !info.factors.is_empty() {
                stack_profits.entry(&info.factors).or_default().push(t.profit);
            }
        }

        let rates: Vec<f64> = ScoreBucket::ALL
            .iter()
            .filter_map(|b| by_score.get(b))
            .filter(|s| s.trades > 0)
            .map(|s| s.win_rate)
            .collect();
        let score_correlation = ScoreCorrelation::from_win_rates(&rates);

        let mut by_factor: Vec<FactorStats> = factor_profits
            .into_iter()
            .filter(|(_, p)| p.len() >= self.config.min_factor_trades)
            .map(|(factor, profits)| {
                let stats = BucketStats::from_profits(profits);
                FactorStats {
                    factor: factor.to_string(),
                    verdict: FactorVerdict::from_win_rate(stats.win_rate),
                    stats,
                }
            })
            .collect();
        // Stable sort keeps alphabetical order between equal win rates
        by_factor.sort_by(|a, b| b.stats.win_rate.total_cmp(&a.stats.win_rate));

        let top_factor = by_factor.first().map(|f| f.factor.clone());
        let removal_candidates = by_factor
            .iter()
            .filter(|f| {
                f.stats.win_rate < self.config.factor_removal_win_rate
                    && f.stats.trades >= self.config.factor_removal_min_trades
            })
            .map(|f| f.factor.clone())
            .collect();

        let mut top_stacks: Vec<FactorStack> = stack_profits
            .into_iter()
            .filter(|(_, p)| p.len() >= MIN_STACK_TRADES)
            .map(|(factors, profits)| FactorStack {
                factors: factors.iter().cloned().collect(),
                stats: BucketStats::from_profits(profits),
            })
            .collect();
        top_stacks.sort_by(|a, b| {
            b.stats
                .win_rate
                .total_cmp(&a.stats.win_rate)
                .then(b.stats.avg_profit.total_cmp(&a.stats.avg_profit))
        });
        top_stacks.truncate(TOP_STACKS);

        let mut by_strategy: BTreeMap<StrategyMode, BucketStats> = BTreeMap::new();
        for t in trades {
            by_strategy.entry(t.strategy_mode).or_default().record(t.profit);
        }
        let strategy_verdicts = by_strategy
            .iter()
            .filter(|(_, s)| s.trades >= MIN_STRATEGY_TRADES)
            .map(|(mode, s)| (*mode, StrategyVerdict::from_win_rate(s.win_rate)))
            .collect();
        let strategy_comparison = compare_strategies(&by_strategy);

        let patterns = if scored.len() >= MIN_PATTERN_SCORED {
            self.patterns(&by_score, &by_factor)
        } else {
            Vec::new()
        };

        Ok(ConfluenceMetrics {
            trades_with_confluence: scored.len(),
            by_score,
            score_correlation,
            by_factor,
            top_factor,
            removal_candidates,
            top_stacks,
            by_strategy,
            strategy_verdicts,
            strategy_comparison,
            breakout_analysis: breakout_analysis(&scored),
            htf_analysis: htf_analysis(&scored),
            patterns,
        })
    }

    fn patterns(
        &self,
        by_score: &BTreeMap<ScoreBucket, BucketStats>,
        by_factor: &[FactorStats],
    ) -> Vec<ConfluencePattern> {
        let min = self.config.min_pattern_trades;
        let mut patterns = Vec::new();

        if let Some(high) = by_score.get(&ScoreBucket::SevenPlus) {
            if high.trades >= min && high.win_rate < 50.0 {
                patterns.push(ConfluencePattern {
                    kind: ConfluencePatternKind::HighScoreUnderperforming,
                    severity: Severity::High,
                    subject: ScoreBucket::SevenPlus.label().to_string(),
                    win_rate: high.win_rate,
                    message: format!(
                        "High confluence scores (7+) underperforming ({:.1}% WR)",
                        high.win_rate
                    ),
                });
            }
        }

        if let Some(low) = by_score.get(&ScoreBucket::AtMostFour) {
            if low.trades >= min && low.win_rate > 70.0 {
                patterns.push(ConfluencePattern {
                    kind: ConfluencePatternKind::LowScoreOutperforming,
                    severity: Severity::Info,
                    subject: ScoreBucket::AtMostFour.label().to_string(),
                    win_rate: low.win_rate,
                    message: format!(
                        "Minimum confluence (score 4) outperforming ({:.1}% WR)",
                        low.win_rate
                    ),
                });
            }
        }

        if let Some(best) = by_factor.first() {
            if best.stats.trades >= min && best.stats.win_rate > 80.0 {
                patterns.push(ConfluencePattern {
                    kind: ConfluencePatternKind::DominantFactor,
                    severity: Severity::Info,
                    subject: best.factor.clone(),
                    win_rate: best.stats.win_rate,
                    message: format!(
                        "'{}' factor highly effective ({:.1}% WR)",
                        best.factor, best.stats.win_rate
                    ),
                });
            }
        }

        patterns
    }
}

fn breakout_analysis(scored: &[&TradeRecord]) -> BreakoutAnalysis {
    let breakouts: Vec<(&TradeRecord, u32)> = scored
        .iter()
        .filter_map(|t| t.breakout.filter(|b| b.is_breakout).map(|b| (*t, b.levels_broken)))
        .collect();
    let levels: Vec<f64> = breakouts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(_, n)| f64::from(*n))
        .collect();
    BreakoutAnalysis {
        stats: BucketStats::from_profits(breakouts.iter().map(|(t, _)| t.profit)),
        avg_levels_broken: mean(&levels).unwrap_or(0.0),
    }
}

fn htf_analysis(scored: &[&TradeRecord]) -> HtfAnalysis {
    let with_htf: Vec<(&TradeRecord, u32)> = scored
        .iter()
        .filter_map(|t| t.htf.filter(|h| h.score > 0).map(|h| (*t, h.score)))
        .collect();
    let scores: Vec<f64> = with_htf.iter().map(|(_, s)| f64::from(*s)).collect();
    HtfAnalysis {
        stats: BucketStats::from_profits(with_htf.iter().map(|(t, _)| t.profit)),
        avg_htf_score: mean(&scores).unwrap_or(0.0),
    }
}

fn compare_strategies(by_strategy: &BTreeMap<StrategyMode, BucketStats>) -> Option<String> {
    let breakout = by_strategy.get(&StrategyMode::Breakout)?;
    let reversion = by_strategy.get(&StrategyMode::MeanReversion)?;
    if breakout.trades < MIN_STRATEGY_TRADES || reversion.trades < MIN_STRATEGY_TRADES {
        return None;
    }
    let (b, m) = (breakout.win_rate, reversion.win_rate);
    if b > m + 20.0 {
        Some(format!("Breakout outperforming mean reversion ({b:.1}% vs {m:.1}%)"))
    } else if m > b + 20.0 {
        Some(format!("Mean reversion outperforming breakout ({m:.1}% vs {b:.1}%)"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::scored;
    use crate::domain::{BreakoutInfo, HtfSignals};
    use approx::assert_relative_eq;

    fn bucket_trades(start: u64, score: u32, wins: usize, total: usize) -> Vec<TradeRecord> {
        (0..total)
            .map(|i| {
                let profit = if i < wins { 10.0 } else { -10.0 };
                scored(start + i as u64, profit, score, &["vwap_bias"])
            })
            .collect()
    }

    #[test]
    fn test_bucket_mapping() {
        assert_eq!(ScoreBucket::from_score(0), ScoreBucket::AtMostFour);
        assert_eq!(ScoreBucket::from_score(4), ScoreBucket::AtMostFour);
        assert_eq!(ScoreBucket::from_score(5), ScoreBucket::Five);
        assert_eq!(ScoreBucket::from_score(6), ScoreBucket::Six);
        assert_eq!(ScoreBucket::from_score(9), ScoreBucket::SevenPlus);
        assert_eq!(serde_json::to_string(&ScoreBucket::SevenPlus).unwrap(), "\"7+\"");
    }

    #[test]
    fn test_correlation_rules() {
        use ScoreCorrelation::*;
        assert_eq!(ScoreCorrelation::from_win_rates(&[40.0, 50.0, 60.0, 70.0]), Excellent);
        assert_eq!(ScoreCorrelation::from_win_rates(&[80.0, 30.0]), Inverted);
        assert_eq!(ScoreCorrelation::from_win_rates(&[40.0, 60.0, 50.0]), Mixed);
        assert_eq!(ScoreCorrelation::from_win_rates(&[50.0, 50.0]), Mixed);
        assert_eq!(ScoreCorrelation::from_win_rates(&[50.0]), InsufficientData);
    }

    #[test]
    fn test_increasing_buckets_excellent() {
        let mut trades = bucket_trades(0, 4, 2, 5);
        trades.extend(bucket_trades(100, 5, 3, 5));
        trades.extend(bucket_trades(200, 6, 4, 5));
        trades.extend(bucket_trades(300, 8, 5, 5));
        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_eq!(m.score_correlation, ScoreCorrelation::Excellent);
        assert_eq!(m.trades_with_confluence, 20);
    }

    #[test]
    fn test_inverted_high_score() {
        let mut trades = bucket_trades(0, 7, 3, 10);
        trades.extend(bucket_trades(100, 4, 4, 5));
        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_relative_eq!(m.by_score[&ScoreBucket::SevenPlus].win_rate, 30.0);
        assert_relative_eq!(m.by_score[&ScoreBucket::AtMostFour].win_rate, 80.0);
        assert_eq!(m.score_correlation, ScoreCorrelation::Inverted);
    }

    #[test]
    fn test_factor_ranking_and_removal() {
        let mut trades = Vec::new();
        // lvn_proximity: 4/4 wins; weak_signal: 1/6 wins; rare: 2 trades only
        for i in 0..4 {
            trades.push(scored(i, 5.0, 5, &["lvn_proximity"]));
        }
        for i in 10..16 {
            let profit = if i == 10 { 5.0 } else { -5.0 };
            trades.push(scored(i, profit, 5, &["weak_signal"]));
        }
        trades.push(scored(20, 5.0, 5, &["rare"]));
        trades.push(scored(21, 5.0, 5, &["rare"]));

        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        let names: Vec<_> = m.by_factor.iter().map(|f| f.factor.as_str()).collect();
        assert_eq!(names, vec!["lvn_proximity", "weak_signal"]);
        assert_eq!(m.top_factor.as_deref(), Some("lvn_proximity"));
        assert_eq!(m.removal_candidates, vec!["weak_signal".to_string()]);
        assert_eq!(m.by_factor[0].verdict, FactorVerdict::Excellent);
        assert_eq!(m.by_factor[1].verdict, FactorVerdict::Poor);
    }

    #[test]
    fn test_top_stacks_need_three_identical_sets() {
        let mut trades = Vec::new();
        for i in 0..3 {
            trades.push(scored(i, 5.0, 6, &["vwap_bias", "lvn_proximity"]));
        }
        for i in 10..12 {
            trades.push(scored(i, 5.0, 6, &["vwap_bias"]));
        }
        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_eq!(m.top_stacks.len(), 1);
        assert_eq!(m.top_stacks[0].factors, vec!["lvn_proximity", "vwap_bias"]);
        assert_eq!(m.top_stacks[0].stats.trades, 3);
    }

    #[test]
    fn test_strategy_split_and_comparison() {
        let mut trades = Vec::new();
        for i in 0..5 {
            let mut t = scored(i, if i < 4 { 5.0 } else { -5.0 }, 5, &["a"]);
            t.strategy_mode = StrategyMode::Breakout;
            trades.push(t);
        }
        for i in 10..15 {
            let mut t = scored(i, if i < 11 { 5.0 } else { -5.0 }, 5, &["a"]);
            t.strategy_mode = StrategyMode::MeanReversion;
            trades.push(t);
        }
        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_eq!(m.strategy_verdicts[&StrategyMode::Breakout], StrategyVerdict::Excellent);
        assert_eq!(m.strategy_verdicts[&StrategyMode::MeanReversion], StrategyVerdict::Poor);
        assert!(m.strategy_comparison.unwrap().starts_with("Breakout outperforming"));
    }

    #[test]
    fn test_no_confluence_trades() {
        let m = ConfluenceAnalyzer::default().analyze(&[]).unwrap();
        assert_eq!(m.score_correlation, ScoreCorrelation::InsufficientData);
        assert!(m.by_factor.is_empty());
        assert!(m.top_factor.is_none());
    }

    fn kinds(m: &ConfluenceMetrics) -> Vec<ConfluencePatternKind> {
        m.patterns.iter().map(|p| p.kind).collect()
    }

    #[test]
    fn test_high_score_underperforming_pattern() {
        let m = ConfluenceAnalyzer::default().analyze(&bucket_trades(0, 8, 3, 10)).unwrap();
        assert_eq!(kinds(&m), vec![ConfluencePatternKind::HighScoreUnderperforming]);
        assert_eq!(m.patterns[0].subject, "7+");
        assert_eq!(m.patterns[0].severity, Severity::High);
        assert_relative_eq!(m.patterns[0].win_rate, 30.0);
    }

    #[test]
    fn test_low_score_outperforming_pattern() {
        let m = ConfluenceAnalyzer::default().analyze(&bucket_trades(0, 4, 8, 10)).unwrap();
        assert_eq!(kinds(&m), vec![ConfluencePatternKind::LowScoreOutperforming]);
        assert_eq!(m.patterns[0].subject, "4");
        assert_eq!(m.patterns[0].severity, Severity::Info);
    }

    #[test]
    fn test_dominant_factor_pattern() {
        let trades: Vec<TradeRecord> = (0..10)
            .map(|i| scored(i, if i < 9 { 6.0 } else { -6.0 }, 5, &["lvn_proximity"]))
            .collect();
        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_eq!(kinds(&m), vec![ConfluencePatternKind::DominantFactor]);
        assert_eq!(m.patterns[0].subject, "lvn_proximity");
        assert!(m.patterns[0].message.contains("90.0% WR"));
    }

    #[test]
    fn test_patterns_need_ten_scored_trades() {
        let m = ConfluenceAnalyzer::default().analyze(&bucket_trades(0, 8, 0, 9)).unwrap();
        assert!(m.patterns.is_empty());
    }

    #[test]
    fn test_breakout_and_htf_sections() {
        let mut trades = bucket_trades(0, 6, 2, 4);
        trades[0].breakout = Some(BreakoutInfo { is_breakout: true, levels_broken: 3 });
        trades[1].breakout = Some(BreakoutInfo { is_breakout: true, levels_broken: 1 });
        trades[2].breakout = Some(BreakoutInfo { is_breakout: true, levels_broken: 0 });
        trades[3].breakout = Some(BreakoutInfo { is_breakout: false, levels_broken: 5 });
        trades[0].htf = Some(HtfSignals { score: 2 });
        trades[2].htf = Some(HtfSignals { score: 3 });
        trades[3].htf = Some(HtfSignals { score: 0 });
        // unscored trades are ignored
        let mut loose = trades[0].clone();
        loose.ticket = 99;
        loose.confluence = None;
        trades.push(loose);

        let m = ConfluenceAnalyzer::default().analyze(&trades).unwrap();
        assert_eq!(m.breakout_analysis.stats.trades, 3);
        assert_eq!(m.breakout_analysis.stats.wins, 2);
        assert_relative_eq!(m.breakout_analysis.avg_levels_broken, 2.0);
        assert_eq!(m.htf_analysis.stats.trades, 2);
        assert_relative_eq!(m.htf_analysis.stats.win_rate, 50.0);
        assert_relative_eq!(m.htf_analysis.avg_htf_score, 2.5);
    }

    #[test]
    fn test_legacy_trades_have_empty_breakout_and_htf() {
        let m = ConfluenceAnalyzer::default().analyze(&bucket_trades(0, 5, 1, 3)).unwrap();
        assert_eq!(m.breakout_analysis, BreakoutAnalysis::default());
        assert_eq!(m.htf_analysis, HtfAnalysis::default());
    }
}
