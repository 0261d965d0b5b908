//! Recommendation merging
//!
//! Turns the analyzer sections of one cycle into a single prioritized list.
//! Each rule only reads one section, so a section omitted after an analyzer
//! failure simply contributes nothing.

use crate::analyzers::{
    ConfluenceMetrics, ConfluencePatternKind, PatternKind, PerformanceMetrics, RecoveryMetrics,
    RecoveryPatternKind, RecoveryVerdict, ScoreCorrelation,
};
use crate::domain::{sort_by_priority, Category, MarketSnapshot, Priority, Recommendation};

/// Blocks must be at least this accurate once enough have resolved
const MIN_BLOCK_ACCURACY: f64 = 50.0;
const MIN_RESOLVED_BLOCKS: usize = 3;
/// Baseline drawdown deterioration that raises the risk alarm
const DRAWDOWN_ALARM_PCT: f64 = 20.0;
const STRONG_TREND_ADX: f64 = 30.0;
const HIGH_VOLATILITY_PERCENTILE: f64 = 70.0;

/// Analyzer output of one cycle (or one report window)
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSections<'a> {
    pub market: &'a [MarketSnapshot],
    pub performance: Option<&'a PerformanceMetrics>,
    pub recovery: Option<&'a RecoveryMetrics>,
    pub confluence: Option<&'a ConfluenceMetrics>,
}

/// Merge all sections into recommendations, HIGH first
pub fn merge_recommendations(sections: CycleSections<'_>) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if let Some(recovery) = sections.recovery {
        recovery_recommendations(recovery, &mut recs);
    }
    if let Some(confluence) = sections.confluence {
        confluence_recommendations(confluence, &mut recs);
    }
    if let Some(performance) = sections.performance {
        performance_recommendations(performance, &mut recs);
    }
    market_recommendations(sections.market, &mut recs);
    sort_by_priority(&mut recs);
    recs
}

fn recovery_recommendations(metrics: &RecoveryMetrics, recs: &mut Vec<Recommendation>) {
    let blocks = &metrics.blocks;
    if blocks.resolved() >= MIN_RESOLVED_BLOCKS {
        if let Some(accuracy) = blocks.accuracy() {
            if accuracy < MIN_BLOCK_ACCURACY {
                recs.push(Recommendation::new(
                    Priority::High,
                    Category::Regime,
                    format!(
                        "Regime gate blocked {} recoveries but only {:.0}% were justified ({} false positives)",
                        blocks.resolved(),
                        accuracy,
                        blocks.false_positives
                    ),
                    "Loosen the Hurst/VHF trend thresholds used to block recovery",
                ));
            }
        }
    }

    if let Some(cmp) = &metrics.baseline {
        if cmp.drawdown_change_pct > DRAWDOWN_ALARM_PCT {
            recs.push(Recommendation::new(
                Priority::High,
                Category::Risk,
                format!(
                    "Recovery drawdown {:.2} is {:.1}% worse than baseline {:.2}",
                    cmp.current_drawdown, cmp.drawdown_change_pct, cmp.baseline_drawdown
                ),
                "Reduce recovery lot multipliers or max levels",
            ));
        }
    }

    for (kind, stats) in &metrics.by_kind {
        match stats.verdict {
            RecoveryVerdict::Tune => recs.push(Recommendation::new(
                Priority::Medium,
                Category::Recovery,
                format!(
                    "{} recovery success rate {:.1}% over {} triggers",
                    kind, stats.success_rate, stats.triggered
                ),
                format!("Tune {} spacing and trigger distance", kind),
            )),
            RecoveryVerdict::ConsiderDisabling => recs.push(Recommendation::new(
                Priority::High,
                Category::Recovery,
                format!(
                    "{} recovery succeeds only {:.1}% of the time ({} triggers)",
                    kind, stats.success_rate, stats.triggered
                ),
                format!("Consider disabling {} recovery", kind),
            )),
            _ => {}
        }
    }

    for pattern in &metrics.patterns {
        if pattern.kind == RecoveryPatternKind::HighRecoveryDepth {
            recs.push(Recommendation::new(
                Priority::Medium,
                Category::Recovery,
                pattern.message.clone(),
                format!("Cap {} recovery levels", pattern.recovery_kind),
            ));
        }
    }
}

fn confluence_recommendations(metrics: &ConfluenceMetrics, recs: &mut Vec<Recommendation>) {
    if metrics.score_correlation == ScoreCorrelation::Inverted {
        recs.push(Recommendation::new(
            Priority::High,
            Category::Confluence,
            "Higher confluence scores are winning less often than lower ones",
            "Investigate signal logic: score correlation is inverted",
        ));
    }

    if let Some(comparison) = &metrics.strategy_comparison {
        recs.push(Recommendation::new(
            Priority::Medium,
            Category::Performance,
            comparison.clone(),
            "Shift allocation toward the stronger strategy mode",
        ));
    }

    for pattern in &metrics.patterns {
        let (priority, action) = match pattern.kind {
            ConfluencePatternKind::HighScoreUnderperforming => (
                Priority::Medium,
                "Check 7+ entries against the market regime at open".to_string(),
            ),
            ConfluencePatternKind::LowScoreOutperforming => {
                (Priority::Low, "Keep the minimum score threshold as is".to_string())
            }
            ConfluencePatternKind::DominantFactor => (
                Priority::Low,
                format!("Consider weighting '{}' higher in the score", pattern.subject),
            ),
        };
        recs.push(Recommendation::new(
            priority,
            Category::Confluence,
            pattern.message.clone(),
            action,
        ));
    }

    for factor in &metrics.removal_candidates {
        let win_rate = metrics
            .by_factor
            .iter()
            .find(|f| &f.factor == factor)
            .map(|f| f.stats.win_rate)
            .unwrap_or(0.0);
        recs.push(Recommendation::new(
            Priority::Low,
            Category::Confluence,
            format!("Factor '{}' wins only {:.1}% of trades", factor, win_rate),
            format!("Remove '{}' from the confluence score", factor),
        ));
    }
}

fn performance_recommendations(metrics: &PerformanceMetrics, recs: &mut Vec<Recommendation>) {
    for pattern in &metrics.patterns {
        match pattern.kind {
            PatternKind::LargeLosses => recs.push(Recommendation::new(
                Priority::High,
                Category::Risk,
                pattern.message.clone(),
                "Tighten stop-loss or reduce size in that regime",
            )),
            PatternKind::LowWinRate => recs.push(Recommendation::new(
                Priority::Medium,
                Category::Performance,
                pattern.message.clone(),
                match pattern.regime {
                    Some(regime) => format!("Avoid or filter entries in {} markets", regime),
                    None => "Review entry filters".to_string(),
                },
            )),
            PatternKind::HighWinRate => {}
        }
    }
}

fn market_recommendations(market: &[MarketSnapshot], recs: &mut Vec<Recommendation>) {
    for snap in market {
        if snap.adx > STRONG_TREND_ADX && snap.volatility_percentile > HIGH_VOLATILITY_PERCENTILE {
            recs.push(Recommendation::new(
                Priority::Medium,
                Category::Regime,
                format!(
                    "{}: strong trend (ADX {:.1}) with high volatility ({:.0}th percentile)",
                    snap.symbol, snap.adx, snap.volatility_percentile
                ),
                "Reduce position size or pause mean-reversion entries",
            ));
        }
        if !snap.recovery_safe {
            recs.push(Recommendation::new(
                Priority::Low,
                Category::Risk,
                format!("{}: recovery unsafe ({})", snap.symbol, snap.recovery_reason),
                "Recovery mechanisms should stay blocked for this symbol",
            ));
        }
    }
}
