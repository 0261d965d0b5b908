//! On-demand deep report
//!
//! Runs the four live analyzers over an arbitrary lookback window plus the
//! regime-accuracy analysis and the threshold sweep, and condenses everything into KEEP / TUNE /
//! REMOVE / FIX action items. Reads the store only, so it may run while the
//! hourly loop is active.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::recommendations::{merge_recommendations, CycleSections};
use super::OrchestratorError;
use crate::analyzers::{
    AnalysisConfig, Baseline, BlockStats, BlockVerdict, ConfluenceAnalyzer, ConfluenceMetrics,
    PerformanceAnalyzer, PerformanceMetrics, RangingVerdict, RecoveryAnalyzer, RecoveryMetrics,
    RecoveryVerdict, RegimeAccuracy, RegimeAccuracyAnalyzer, RegimeThresholdOptimizer,
    ScoreCorrelation, StrategyVerdict, ThresholdOptimization, TrendingVerdict,
};
use crate::domain::{ActionItem, ActionVerb, MarketSnapshot, Priority, Recommendation};
use crate::ports::{RecordFilter, TimeSeriesStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: u32,
    pub window_start: DateTime<Utc>,
    pub min_trades: usize,
    pub trades_analyzed: usize,
    /// Fewer than `min_trades` trades in the window; all sections are empty
    pub insufficient_data: bool,
    pub performance: Option<PerformanceMetrics>,
    pub recovery: Option<RecoveryMetrics>,
    pub confluence: Option<ConfluenceMetrics>,
    pub regime_accuracy: Option<RegimeAccuracy>,
    /// Suggested Hurst/VHF/ADX cut-offs; never applied automatically
    #[serde(default)]
    pub threshold_optimization: Option<ThresholdOptimization>,
    pub recommendations: Vec<Recommendation>,
    pub action_items: Vec<ActionItem>,
}

#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<dyn TimeSeriesStore>,
    config: AnalysisConfig,
    join_tolerance: Duration,
    baseline: Option<Arc<Baseline>>,
}

impl ReportGenerator {
    pub fn new(store: Arc<dyn TimeSeriesStore>, config: AnalysisConfig) -> Self {
        Self {
            store,
            config,
            join_tolerance: Duration::minutes(120),
            baseline: None,
        }
    }

    pub fn with_join_tolerance(mut self, tolerance: Duration) -> Self {
        self.join_tolerance = tolerance;
        self
    }

    pub fn with_baseline(mut self, baseline: Option<Arc<Baseline>>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Analyze the last `days` days. Store read failures are errors;
    /// analyzer failures only drop their own section.
    pub fn generate_report(&self, days: u32, min_trades: usize) -> Result<Report, OrchestratorError> {
        self.generate_report_at(Utc::now(), days, min_trades)
    }

    pub fn generate_report_at(
        &self,
        now: DateTime<Utc>,
        days: u32,
        min_trades: usize,
    ) -> Result<Report, OrchestratorError> {
        let window_start = now - Duration::days(i64::from(days));
        let filter = RecordFilter::since(window_start).until(now);
        let trades = self.store.trades(&filter)?;

        let mut report = Report {
            generated_at: now,
            lookback_days: days,
            window_start,
            min_trades,
            trades_analyzed: trades.len(),
            insufficient_data: false,
            performance: None,
            recovery: None,
            confluence: None,
            regime_accuracy: None,
            threshold_optimization: None,
            recommendations: Vec::new(),
            action_items: Vec::new(),
        };

        if trades.len() < min_trades {
            info!(
                trades = trades.len(),
                min_trades, days, "Insufficient data for report"
            );
            report.insufficient_data = true;
            return Ok(report);
        }

        let actions = self.store.recovery_actions(&filter)?;
        // snapshots start one tolerance earlier so the first trades can still match
        let snapshots = self
            .store
            .market_snapshots(&RecordFilter::since(window_start - self.join_tolerance).until(now))?;

        report.performance = PerformanceAnalyzer::new(self.config.clone())
            .analyze(&trades, window_start, now)
            .map_err(|e| error!("Performance analysis failed: {}", e))
            .ok();
        report.recovery = RecoveryAnalyzer::new(self.config.clone())
            .analyze(&actions, &trades, self.baseline.as_deref())
            .map_err(|e| error!("Recovery analysis failed: {}", e))
            .ok();
        report.confluence = ConfluenceAnalyzer::new(self.config.clone())
            .analyze(&trades)
            .map_err(|e| error!("Confluence analysis failed: {}", e))
            .ok();

        let blocks = report
            .recovery
            .as_ref()
            .map(|r| r.blocks.clone())
            .unwrap_or_else(BlockStats::default);
        report.regime_accuracy = RegimeAccuracyAnalyzer::new(self.join_tolerance)
            .analyze(&trades, &snapshots, &blocks)
            .map_err(|e| error!("Regime accuracy analysis failed: {}", e))
            .ok();
        report.threshold_optimization = RegimeThresholdOptimizer::new(self.join_tolerance, min_trades)
            .optimize(&trades, &snapshots)
            .map_err(|e| error!("Threshold optimization failed: {}", e))
            .ok();

        let latest = latest_per_symbol(&snapshots);
        report.recommendations = merge_recommendations(CycleSections {
            market: &latest,
            performance: report.performance.as_ref(),
            recovery: report.recovery.as_ref(),
            confluence: report.confluence.as_ref(),
        });
        report.action_items = action_items(&report);

        info!(
            trades = report.trades_analyzed,
            recommendations = report.recommendations.len(),
            actions = report.action_items.len(),
            "Report generated"
        );
        Ok(report)
    }
}

fn latest_per_symbol(snapshots: &[MarketSnapshot]) -> Vec<MarketSnapshot> {
    let mut latest: BTreeMap<&str, &MarketSnapshot> = BTreeMap::new();
    for s in snapshots {
        match latest.get(s.symbol.as_str()) {
            Some(prev) if prev.timestamp >= s.timestamp => {}
            _ => {
                latest.insert(s.symbol.as_str(), s);
            }
        }
    }
    latest.into_values().cloned().collect()
}

fn item(verb: ActionVerb, priority: Priority, target: impl Into<String>, reason: impl Into<String>) -> ActionItem {
    ActionItem {
        verb,
        priority,
        target: target.into(),
        reason: reason.into(),
    }
}

/// Consolidated action list, most urgent first
pub fn action_items(report: &Report) -> Vec<ActionItem> {
    let mut items = Vec::new();

    if let Some(acc) = &report.regime_accuracy {
        match acc.ranging_verdict {
            Some(RangingVerdict::Poor) => items.push(item(
                ActionVerb::Fix,
                Priority::High,
                "regime detection",
                format!("ranging trades win only {:.1}%", acc.ranging.win_rate),
            )),
            Some(RangingVerdict::Excellent) => items.push(item(
                ActionVerb::Keep,
                Priority::Low,
                "regime detection",
                format!("ranging trades win {:.1}%", acc.ranging.win_rate),
            )),
            _ => {}
        }
        if acc.trending_verdict == Some(TrendingVerdict::Warning) {
            items.push(item(
                ActionVerb::Tune,
                Priority::Medium,
                "trend thresholds",
                format!(
                    "trending-tagged trades still win {:.1}%, trends may be over-detected",
                    acc.trending.win_rate
                ),
            ));
        }
        match acc.block_verdict {
            Some(BlockVerdict::Poor) => items.push(item(
                ActionVerb::Fix,
                Priority::High,
                "recovery block gate",
                format!(
                    "only {:.0}% of blocked recoveries were justified",
                    acc.block_accuracy.unwrap_or(0.0)
                ),
            )),
            Some(BlockVerdict::Excellent) => items.push(item(
                ActionVerb::Keep,
                Priority::Low,
                "recovery block gate",
                format!("{:.0}% of blocks justified", acc.block_accuracy.unwrap_or(0.0)),
            )),
            _ => {}
        }
    }

    if let Some(recovery) = &report.recovery {
        for (kind, stats) in &recovery.by_kind {
            let reason = format!(
                "{:.1}% success over {} triggers",
                stats.success_rate, stats.triggered
            );
            match stats.verdict {
                RecoveryVerdict::Keep | RecoveryVerdict::Good => {
                    items.push(item(ActionVerb::Keep, Priority::Low, format!("{kind} recovery"), reason))
                }
                RecoveryVerdict::Tune => {
                    items.push(item(ActionVerb::Tune, Priority::Medium, format!("{kind} recovery"), reason))
                }
                RecoveryVerdict::ConsiderDisabling => {
                    items.push(item(ActionVerb::Remove, Priority::High, format!("{kind} recovery"), reason))
                }
                RecoveryVerdict::InsufficientData => {}
            }
        }
    }

    if let Some(confluence) = &report.confluence {
        if confluence.score_correlation == ScoreCorrelation::Inverted {
            items.push(item(
                ActionVerb::Fix,
                Priority::High,
                "confluence scoring",
                "win rate falls as score rises",
            ));
        }
        for factor in &confluence.removal_candidates {
            items.push(item(
                ActionVerb::Remove,
                Priority::Low,
                format!("factor '{factor}'"),
                "win rate below removal threshold",
            ));
        }
        if let Some(top) = &confluence.top_factor {
            items.push(item(
                ActionVerb::Keep,
                Priority::Low,
                format!("factor '{top}'"),
                "highest win rate among confluence factors",
            ));
        }
        for (mode, verdict) in &confluence.strategy_verdicts {
            match verdict {
                StrategyVerdict::Poor => items.push(item(
                    ActionVerb::Tune,
                    Priority::Medium,
                    format!("{mode} strategy"),
                    "poor win rate",
                )),
                StrategyVerdict::Excellent => items.push(item(
                    ActionVerb::Keep,
                    Priority::Low,
                    format!("{mode} strategy"),
                    "excellent win rate",
                )),
                _ => {}
            }
        }
    }

    if let Some(best) = report.threshold_optimization.as_ref().and_then(|o| o.best.as_ref()) {
        items.push(item(
            ActionVerb::Tune,
            Priority::Low,
            "regime thresholds",
            format!(
                "{} split {} scores {:.0} with {:.0}% coverage",
                best.method, best.thresholds, best.score, best.coverage
            ),
        ));
    }

    items.sort_by_key(|i| (i.priority, i.verb));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryStore;
    use crate::analyzers::fixtures::{action, scored};
    use crate::analyzers::OptimizerMethod;
    use crate::domain::{MarketSnapshot, RecoveryKind, TradeRecord};

    fn recent(mut t: TradeRecord, hours_ago: i64) -> TradeRecord {
        t.close_time = Utc::now() - Duration::hours(hours_ago);
        t.open_time = t.close_time - Duration::minutes(30);
        t
    }

    fn generator_with(trades: Vec<TradeRecord>) -> (ReportGenerator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        for t in trades {
            store.append_trade(t).unwrap();
        }
        let generator = ReportGenerator::new(store.clone(), AnalysisConfig::default());
        (generator, store)
    }

    #[test]
    fn test_insufficient_data_is_a_report_state() {
        let trades = (0..3).map(|i| recent(scored(i, 5.0, 5, &["vwap"]), 2)).collect();
        let (generator, _) = generator_with(trades);

        let report = generator.generate_report(7, 10).unwrap();
        assert!(report.insufficient_data);
        assert_eq!(report.trades_analyzed, 3);
        assert!(report.performance.is_none());
        assert!(report.action_items.is_empty());
    }

    #[test]
    fn test_window_excludes_older_trades() {
        let trades = vec![
            recent(scored(1, 5.0, 5, &["vwap"]), 2),
            recent(scored(2, 5.0, 5, &["vwap"]), 24 * 5),
        ];
        let (generator, _) = generator_with(trades);
        let report = generator.generate_report(3, 1).unwrap();
        assert_eq!(report.trades_analyzed, 1);
        assert!(!report.insufficient_data);
        assert!(report.performance.is_some());
    }

    #[test]
    fn test_inverted_confluence_yields_fix() {
        let mut trades: Vec<_> = (0..10)
            .map(|i| recent(scored(i, if i < 3 { 10.0 } else { -10.0 }, 7, &["ob"]), 3))
            .collect();
        trades.extend(
            (10..20).map(|i| recent(scored(i, if i < 18 { 10.0 } else { -10.0 }, 4, &["vwap"]), 3)),
        );
        let (generator, _) = generator_with(trades);
        let report = generator.generate_report(7, 10).unwrap();

        let first = &report.action_items[0];
        assert_eq!(first.verb, ActionVerb::Fix);
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.target, "confluence scoring");
        // "ob" wins 30% over 10 trades
        assert!(report
            .action_items
            .iter()
            .any(|i| i.verb == ActionVerb::Remove && i.target == "factor 'ob'"));
    }

    #[test]
    fn test_recovery_verdicts_map_to_verbs() {
        let trades: Vec<_> = (0..5)
            .map(|i| recent(scored(100 + i, 10.0, 5, &["vwap"]), 1))
            .collect();
        let (generator, store) = generator_with(trades);
        for i in 0..5 {
            let mut a = action(RecoveryKind::Dca, i + 1, 100 + i, 1);
            a.timestamp = Utc::now() - Duration::hours(2);
            store.append_recovery_action(a).unwrap();
        }

        let report = generator.generate_report(7, 5).unwrap();
        let dca = report
            .action_items
            .iter()
            .find(|i| i.target == "dca recovery")
            .unwrap();
        assert_eq!(dca.verb, ActionVerb::Keep);
        assert!(report.action_items.iter().all(|i| i.target != "grid recovery"));
    }

    #[test]
    fn test_report_suggests_separating_thresholds() {
        let trades: Vec<_> = (0..20)
            .map(|i| recent(scored(i, if i % 2 == 0 { 8.0 } else { -8.0 }, 5, &["vwap"]), 3 + i as i64))
            .collect();
        let (generator, store) = generator_with(trades.clone());
        for t in &trades {
            let mut s = MarketSnapshot::unknown(t.symbol.clone(), t.open_time, "test");
            s.hurst = Some(if t.profit > 0.0 { 0.44 } else { 0.58 });
            s.vhf = Some(0.32);
            s.adx = 21.0;
            store.append_market_snapshot(s).unwrap();
        }

        let report = generator.generate_report(7, 10).unwrap();
        let opt = report.threshold_optimization.as_ref().unwrap();
        assert_eq!(opt.trades_matched, 20);
        let best = opt.best.as_ref().unwrap();
        assert_eq!(best.method, OptimizerMethod::HurstOnly);
        assert_eq!(best.thresholds.hurst_ranging, Some(0.45));
        assert!(report
            .action_items
            .iter()
            .any(|i| i.verb == ActionVerb::Tune && i.target == "regime thresholds"));
    }
}
