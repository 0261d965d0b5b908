//! Performance Analyzer
//!
//! Aggregates closed trades: totals, win rate, profit factor, durations,
//! and breakdowns by regime at open and by close hour. Flags regime buckets
//! that win unusually rarely or often, and clusters of large losses.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ensure_finite, percent, AnalysisConfig, AnalyzerError, BucketStats};
use crate::domain::{MarketRegime, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    LowWinRate,
    HighWinRate,
    LargeLosses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePattern {
    pub kind: PatternKind,
    pub severity: Severity,
    /// Bucket the pattern applies to; for large losses the most frequent regime
    pub regime: Option<MarketRegime>,
    pub trades: usize,
    pub win_rate: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub max_profit: f64,
    pub min_profit: f64,
    /// Gross win over |gross loss|; 0.0 when there are no losses
    pub profit_factor: f64,
    pub avg_duration_minutes: f64,
    pub max_duration_minutes: f64,
    pub by_regime: BTreeMap<MarketRegime, BucketStats>,
    /// Keyed by UTC close hour
    pub by_hour: BTreeMap<u32, BucketStats>,
    pub patterns: Vec<PerformancePattern>,
}

impl PerformanceMetrics {
    fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            total_profit: 0.0,
            avg_profit: 0.0,
            max_profit: 0.0,
            min_profit: 0.0,
            profit_factor: 0.0,
            avg_duration_minutes: 0.0,
            max_duration_minutes: 0.0,
            by_regime: BTreeMap::new(),
            by_hour: BTreeMap::new(),
            patterns: Vec::new(),
        }
    }

    /// Close hour with the best win rate among hours with at least `min` trades
    pub fn best_hour(&self, min: usize) -> Option<(u32, &BucketStats)> {
        self.by_hour
            .iter()
            .filter(|(_, s)| s.trades >= min)
            .max_by(|a, b| a.1.win_rate.total_cmp(&b.1.win_rate))
            .map(|(h, s)| (*h, s))
    }

    pub fn worst_hour(&self, min: usize) -> Option<(u32, &BucketStats)> {
        self.by_hour
            .iter()
            .filter(|(_, s)| s.trades >= min)
            .min_by(|a, b| a.1.win_rate.total_cmp(&b.1.win_rate))
            .map(|(h, s)| (*h, s))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceAnalyzer {
    config: AnalysisConfig,
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyze trades that closed inside `[window_start, window_end]`.
    ///
    /// Trades outside the window are ignored. An empty window is not an error.
    pub fn analyze(
        &self,
        trades: &[TradeRecord],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<PerformanceMetrics, AnalyzerError> {
        let in_window: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.close_time >= window_start && t.close_time <= window_end)
            .collect();
        for t in &in_window {
            ensure_finite("profit", t.ticket, t.profit)?;
            ensure_finite("duration", t.ticket, t.duration_minutes)?;
        }

        let mut metrics = PerformanceMetrics::empty(window_start, window_end);
        if in_window.is_empty() {
            return Ok(metrics);
        }

        let n = in_window.len();
        let mut gross_win = 0.0;
        let mut gross_loss = 0.0;
        let mut max_profit = f64::NEG_INFINITY;
        let mut min_profit = f64::INFINITY;
        let mut total_duration = 0.0;
        let mut max_duration: f64 = 0.0;

        for t in &in_window {
            if t.is_win() {
                metrics.wins += 1;
                gross_win += t.profit;
            } else {
                metrics.losses += 1;
                gross_loss += t.profit.abs();
            }
            max_profit = max_profit.max(t.profit);
            min_profit = min_profit.min(t.profit);
            total_duration += t.duration_minutes;
            max_duration = max_duration.max(t.duration_minutes);

            metrics.by_regime.entry(t.market_regime).or_default().record(t.profit);
            metrics.by_hour.entry(t.close_hour()).or_default().record(t.profit);
        }

        metrics.total_trades = n;
        metrics.win_rate = percent(metrics.wins, n);
        metrics.total_profit = gross_win - gross_loss;
        metrics.avg_profit = metrics.total_profit / n as f64;
        metrics.max_profit = max_profit;
        metrics.min_profit = min_profit;
        metrics.profit_factor = if gross_loss > 0.0 { gross_win / gross_loss } else { 0.0 };
        metrics.avg_duration_minutes = total_duration / n as f64;
        metrics.max_duration_minutes = max_duration;
        metrics.patterns = self.patterns(&in_window, &metrics.by_regime);

        Ok(metrics)
    }

    fn patterns(
        &self,
        trades: &[&TradeRecord],
        by_regime: &BTreeMap<MarketRegime, BucketStats>,
    ) -> Vec<PerformancePattern> {
        let mut patterns = Vec::new();
        let min = self.config.min_pattern_trades;

        for (regime, stats) in by_regime {
            if stats.trades < min {
                continue;
            }
            if stats.win_rate < 40.0 {
                patterns.push(PerformancePattern {
                    kind: PatternKind::LowWinRate,
                    severity: Severity::High,
                    regime: Some(*regime),
                    trades: stats.trades,
                    win_rate: Some(stats.win_rate),
                    message: format!(
                        "Low win rate in {regime} market: {:.1}% over {} trades",
                        stats.win_rate, stats.trades
                    ),
                });
            } else if stats.win_rate > 70.0 {
                patterns.push(PerformancePattern {
                    kind: PatternKind::HighWinRate,
                    severity: Severity::Info,
                    regime: Some(*regime),
                    trades: stats.trades,
                    win_rate: Some(stats.win_rate),
                    message: format!(
                        "High win rate in {regime} market: {:.1}% over {} trades",
                        stats.win_rate, stats.trades
                    ),
                });
            }
        }

        let threshold = self.config.large_loss_threshold;
        let large: Vec<&&TradeRecord> = trades.iter().filter(|t| t.profit < -threshold).collect();
        if large.len() >= 3 {
            let mut counts: HashMap<MarketRegime, usize> = HashMap::new();
            for t in &large {
                *counts.entry(t.market_regime).or_default() += 1;
            }
            // Highest count, ties broken by regime order for stable output
            let common = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(r, _)| r);
            patterns.push(PerformancePattern {
                kind: PatternKind::LargeLosses,
                severity: Severity::Critical,
                regime: common,
                trades: large.len(),
                win_rate: None,
                message: format!(
                    "{} losses beyond {threshold:.2}, mostly in {} market",
                    large.len(),
                    common.unwrap_or(MarketRegime::Unknown)
                ),
            });
        }

        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::fixtures::{base_time, trade};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (base_time() - Duration::hours(1), base_time() + Duration::days(1))
    }

    #[test]
    fn test_totals_and_profit_factor() {
        let trades = vec![
            trade(1, 30.0, MarketRegime::Ranging),
            trade(2, -10.0, MarketRegime::Ranging),
            trade(3, 20.0, MarketRegime::Choppy),
            trade(4, -15.0, MarketRegime::TrendingUp),
        ];
        let (start, end) = window();
        let m = PerformanceAnalyzer::default().analyze(&trades, start, end).unwrap();
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.wins, 2);
        assert_relative_eq!(m.win_rate, 50.0);
        assert_relative_eq!(m.total_profit, 25.0);
        assert_relative_eq!(m.profit_factor, 2.0);
        assert_relative_eq!(m.max_profit, 30.0);
        assert_relative_eq!(m.min_profit, -15.0);
        assert_eq!(m.by_regime[&MarketRegime::Ranging].trades, 2);
        assert_eq!(m.by_hour.len(), 4);
    }

    #[test]
    fn test_all_winners_profit_factor_sentinel() {
        let trades: Vec<_> = (1..=4).map(|i| trade(i, 5.0, MarketRegime::Ranging)).collect();
        let (start, end) = window();
        let m = PerformanceAnalyzer::default().analyze(&trades, start, end).unwrap();
        assert_eq!(m.profit_factor, 0.0);
        assert_relative_eq!(m.win_rate, 100.0);
    }

    #[test]
    fn test_empty_window() {
        let trades = vec![trade(1, 5.0, MarketRegime::Ranging)];
        let start = base_time() + Duration::days(3);
        let m = PerformanceAnalyzer::default()
            .analyze(&trades, start, start + Duration::hours(24))
            .unwrap();
        assert_eq!(m.total_trades, 0);
        assert!(m.patterns.is_empty());
    }

    #[test]
    fn test_low_and_high_win_rate_patterns() {
        let mut trades = Vec::new();
        // trending_down: 1 of 5 wins
        for i in 0..5 {
            let profit = if i == 0 { 5.0 } else { -5.0 };
            trades.push(trade(i, profit, MarketRegime::TrendingDown));
        }
        // ranging: 5 of 6 wins
        for i in 10..16 {
            let profit = if i == 10 { -5.0 } else { 5.0 };
            trades.push(trade(i, profit, MarketRegime::Ranging));
        }
        // choppy: only 4 trades, never flagged
        for i in 20..24 {
            trades.push(trade(i, -5.0, MarketRegime::Choppy));
        }
        let (start, end) = window();
        let m = PerformanceAnalyzer::default().analyze(&trades, start, end).unwrap();

        let low: Vec<_> = m.patterns.iter().filter(|p| p.kind == PatternKind::LowWinRate).collect();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].regime, Some(MarketRegime::TrendingDown));
        assert_eq!(low[0].severity, Severity::High);

        let high: Vec<_> = m.patterns.iter().filter(|p| p.kind == PatternKind::HighWinRate).collect();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].regime, Some(MarketRegime::Ranging));
        assert_eq!(high[0].severity, Severity::Info);
    }

    #[test]
    fn test_large_losses_names_common_regime() {
        let trades = vec![
            trade(1, -80.0, MarketRegime::TrendingUp),
            trade(2, -60.0, MarketRegime::TrendingUp),
            trade(3, -55.0, MarketRegime::Ranging),
            trade(4, -40.0, MarketRegime::Ranging),
        ];
        let (start, end) = window();
        let m = PerformanceAnalyzer::default().analyze(&trades, start, end).unwrap();
        let large = m.patterns.iter().find(|p| p.kind == PatternKind::LargeLosses).unwrap();
        assert_eq!(large.severity, Severity::Critical);
        assert_eq!(large.trades, 3);
        assert_eq!(large.regime, Some(MarketRegime::TrendingUp));
    }

    #[test]
    fn test_non_finite_profit_is_malformed() {
        let trades = vec![trade(1, f64::NAN, MarketRegime::Ranging)];
        let (start, end) = window();
        assert!(PerformanceAnalyzer::default().analyze(&trades, start, end).is_err());
    }

    #[test]
    fn test_best_and_worst_hour() {
        let trades = vec![
            trade(1, 5.0, MarketRegime::Ranging),
            trade(25, 5.0, MarketRegime::Ranging),
            trade(2, -5.0, MarketRegime::Ranging),
            trade(26, -5.0, MarketRegime::Ranging),
        ];
        let (start, end) = window();
        let m = PerformanceAnalyzer::default().analyze(&trades, start, end).unwrap();
        assert_eq!(m.best_hour(2).map(|(h, _)| h), Some(1));
        assert_eq!(m.worst_hour(2).map(|(h, _)| h), Some(2));
    }
}
