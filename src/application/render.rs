//! Text rendering of hourly summaries and reports, plus JSON export

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use super::report::Report;
use crate::analyzers::{ConfluenceMetrics, PerformanceMetrics, RecoveryMetrics, ThresholdOptimization};
use crate::domain::{HourlySnapshot, MarketSnapshot, Recommendation, RecoveryKind};

pub const SUMMARY_FILE: &str = "latest_summary.json";

fn opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(x) => format!("{:.*}", precision, x),
        None => "n/a".to_string(),
    }
}

fn market_line(out: &mut String, s: &MarketSnapshot) {
    let _ = writeln!(
        out,
        "  {:<8} {:<15} stat={:<8} conf={:.2} ADX={:.1} H={} VHF={} ATR={:.5} vol%={:.0} recovery={} ({})",
        s.symbol,
        s.regime,
        s.statistical_regime,
        s.regime_confidence,
        s.adx,
        opt(s.hurst, 3),
        opt(s.vhf, 3),
        s.atr,
        s.volatility_percentile,
        if s.recovery_safe { "SAFE" } else { "BLOCKED" },
        s.recovery_reason,
    );
}

fn performance_lines(out: &mut String, p: &PerformanceMetrics) {
    let _ = writeln!(
        out,
        "Performance: {} trades, {} wins, win rate {:.1}%, profit {:.2}, profit factor {:.2}",
        p.total_trades, p.wins, p.win_rate, p.total_profit, p.profit_factor
    );
    if let Some((hour, stats)) = p.best_hour(3) {
        let _ = writeln!(out, "  best hour {:02}:00 ({:.1}%)", hour, stats.win_rate);
    }
    if let Some((hour, stats)) = p.worst_hour(3) {
        let _ = writeln!(out, "  worst hour {:02}:00 ({:.1}%)", hour, stats.win_rate);
    }
    for pattern in &p.patterns {
        let _ = writeln!(out, "  pattern: {}", pattern.message);
    }
}

fn recovery_lines(out: &mut String, r: &RecoveryMetrics) {
    let _ = writeln!(out, "Recovery:");
    for kind in RecoveryKind::MECHANISMS {
        if let Some(stats) = r.kind(kind) {
            let _ = writeln!(
                out,
                "  {:<6} triggered={} successful={} pending={} success={:.1}% verdict={:?}",
                kind, stats.triggered, stats.successful, stats.pending, stats.success_rate, stats.verdict
            );
        }
    }
    if r.stacks.stacks > 0 {
        let _ = writeln!(
            out,
            "  stacks={} avg max drawdown={:.2} avg max volume={:.2} actions/stack={:.1}",
            r.stacks.stacks, r.stacks.avg_max_drawdown, r.stacks.avg_max_volume, r.stacks.avg_actions_per_stack
        );
    }
    if r.blocks.total > 0 {
        let _ = writeln!(
            out,
            "  blocks={} justified={} false positives={} unresolved={}",
            r.blocks.total, r.blocks.justified, r.blocks.false_positives, r.blocks.unresolved
        );
    }
    if let Some(b) = &r.baseline {
        let _ = writeln!(
            out,
            "  baseline drawdown {:.2} -> {:.2} ({:+.1}%, {:?})",
            b.baseline_drawdown, b.current_drawdown, b.drawdown_change_pct, b.drawdown_trend
        );
    }
}

fn confluence_lines(out: &mut String, c: &ConfluenceMetrics) {
    let _ = writeln!(
        out,
        "Confluence: {} scored trades, correlation {:?}",
        c.trades_with_confluence, c.score_correlation
    );
    for (bucket, stats) in &c.by_score {
        let _ = writeln!(
            out,
            "  score {:<3} trades={} win rate={:.1}% avg profit={:.2}",
            bucket, stats.trades, stats.win_rate, stats.avg_profit
        );
    }
    if let Some(top) = &c.top_factor {
        let _ = writeln!(out, "  top factor: {}", top);
    }
    if !c.removal_candidates.is_empty() {
        let _ = writeln!(out, "  removal candidates: {}", c.removal_candidates.join(", "));
    }
    let b = &c.breakout_analysis;
    if b.stats.trades > 0 {
        let _ = writeln!(
            out,
            "  breakouts={} win rate={:.1}% avg levels broken={:.1}",
            b.stats.trades, b.stats.win_rate, b.avg_levels_broken
        );
    }
    let h = &c.htf_analysis;
    if h.stats.trades > 0 {
        let _ = writeln!(
            out,
            "  with HTF signal={} win rate={:.1}% avg HTF score={:.1}",
            h.stats.trades, h.stats.win_rate, h.avg_htf_score
        );
    }
    for pattern in &c.patterns {
        let _ = writeln!(out, "  pattern: {}", pattern.message);
    }
}

fn threshold_lines(out: &mut String, sweep: &ThresholdOptimization) {
    if sweep.insufficient_data {
        let _ = writeln!(
            out,
            "Threshold sweep: {} of {} trades matched to indicator readings, not enough to compare",
            sweep.trades_matched, sweep.trades_analyzed
        );
        return;
    }
    let _ = writeln!(out, "Threshold sweep ({} matched trades):", sweep.trades_matched);
    for c in &sweep.best_by_method {
        let _ = writeln!(
            out,
            "  {:<13} {:<28} score={:.1} ranging {:.1}% ({}) trending {:.1}% ({}) coverage={:.0}%",
            c.method.to_string(),
            c.thresholds.to_string(),
            c.score,
            c.ranging.win_rate,
            c.ranging.trades,
            c.trending.win_rate,
            c.trending.trades,
            c.coverage
        );
    }
    match &sweep.best {
        Some(best) => {
            let _ = writeln!(out, "  suggested: {} {}", best.method, best.thresholds);
        }
        None => {
            let _ = writeln!(out, "  suggested: none");
        }
    }
}

fn recommendation_lines(out: &mut String, recs: &[Recommendation]) {
    if recs.is_empty() {
        let _ = writeln!(out, "Recommendations: none");
        return;
    }
    let _ = writeln!(out, "Recommendations:");
    for r in recs {
        let _ = writeln!(out, "  [{}] {}: {} -> {}", r.priority, r.category, r.message, r.action);
    }
}

/// Human-readable summary of one hourly cycle
pub fn render_summary(snapshot: &HourlySnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Diagnostic cycle {} ===",
        snapshot.timestamp.format("%Y-%m-%d %H:%M UTC")
    );
    if snapshot.market.is_empty() {
        let _ = writeln!(out, "Market: no symbols classified");
    } else {
        let _ = writeln!(out, "Market:");
        for s in &snapshot.market {
            market_line(&mut out, s);
        }
    }
    match &snapshot.performance {
        Some(p) => performance_lines(&mut out, p),
        None => {
            let _ = writeln!(out, "Performance: unavailable");
        }
    }
    match &snapshot.recovery {
        Some(r) => recovery_lines(&mut out, r),
        None => {
            let _ = writeln!(out, "Recovery: unavailable");
        }
    }
    match &snapshot.confluence {
        Some(c) => confluence_lines(&mut out, c),
        None => {
            let _ = writeln!(out, "Confluence: unavailable");
        }
    }
    recommendation_lines(&mut out, &snapshot.recommendations);
    out
}

/// Human-readable deep report
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Diagnostic report: last {} days ({} trades) ===",
        report.lookback_days, report.trades_analyzed
    );
    if report.insufficient_data {
        let _ = writeln!(
            out,
            "Insufficient data: {} trades, at least {} required",
            report.trades_analyzed, report.min_trades
        );
        return out;
    }
    if let Some(p) = &report.performance {
        performance_lines(&mut out, p);
    }
    if let Some(r) = &report.recovery {
        recovery_lines(&mut out, r);
    }
    if let Some(c) = &report.confluence {
        confluence_lines(&mut out, c);
    }
    if let Some(acc) = &report.regime_accuracy {
        let _ = writeln!(
            out,
            "Regime accuracy: ranging {:.1}% ({} trades), trending {:.1}% ({} trades), matched {}/{}",
            acc.ranging.win_rate,
            acc.ranging.trades,
            acc.trending.win_rate,
            acc.trending.trades,
            acc.matched_to_snapshot,
            acc.trades_analyzed
        );
        if let Some(a) = acc.block_accuracy {
            let _ = writeln!(out, "  block accuracy {:.1}% ({:?})", a, acc.block_verdict);
        }
    }
    if let Some(sweep) = &report.threshold_optimization {
        threshold_lines(&mut out, sweep);
    }
    recommendation_lines(&mut out, &report.recommendations);
    if !report.action_items.is_empty() {
        let _ = writeln!(out, "Actions:");
        for item in &report.action_items {
            let _ = writeln!(out, "  {:<6} {} - {} [{}]", item.verb, item.target, item.reason, item.priority);
        }
    }
    out
}

/// Write the snapshot as `latest_summary.json` in `dir`, replacing any previous one
pub fn export_summary(dir: &Path, snapshot: &HourlySnapshot) -> io::Result<PathBuf> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(SUMMARY_FILE);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}
