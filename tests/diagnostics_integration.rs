//! End-to-end diagnostics scenarios through the public API

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use regime_sentinel::adapters::market_data::SyntheticMarketData;
use regime_sentinel::adapters::store::{InMemoryStore, JsonFileStore};
use regime_sentinel::analyzers::{
    AnalysisConfig, ConfluenceAnalyzer, RecoveryVerdict, ScoreBucket, ScoreCorrelation,
};
use regime_sentinel::domain::{
    ConfluenceInfo, MarketRegime, MarketSnapshot, RecoveryActionPayload, RecoveryKind,
    StrategyMode, TradeClosePayload, TradeRecord,
};
use regime_sentinel::ports::{RecordFilter, RetentionPolicy, TimeSeriesStore};
use regime_sentinel::strategy::{IndicatorReadings, RegimeClassifier};
use regime_sentinel::{DiagnosticOrchestrator, OrchestratorSettings};

fn orchestrator(store: Arc<dyn TimeSeriesStore>) -> DiagnosticOrchestrator {
    let settings = OrchestratorSettings {
        symbols: vec!["EURUSD".to_string()],
        interval: Duration::from_millis(50),
        error_backoff: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    DiagnosticOrchestrator::new(store, Arc::new(SyntheticMarketData::default()), settings)
}

fn trade_close(ticket: u64, profit: f64, regime: Option<MarketRegime>) -> TradeClosePayload {
    let close_time = Utc::now() - ChronoDuration::minutes(5);
    TradeClosePayload {
        ticket,
        symbol: "EURUSD".to_string(),
        open_time: close_time - ChronoDuration::hours(1),
        close_time,
        profit,
        market_regime: regime,
        confluence: None,
        strategy_mode: None,
        breakout: None,
        htf: None,
    }
}

fn scored_trade(ticket: u64, profit: f64, score: u32) -> TradeRecord {
    let close_time = Utc::now() - ChronoDuration::hours(1);
    TradeRecord {
        ticket,
        symbol: "EURUSD".to_string(),
        open_time: close_time - ChronoDuration::minutes(30),
        close_time,
        profit,
        duration_minutes: 30.0,
        market_regime: MarketRegime::Ranging,
        confluence: Some(ConfluenceInfo::new(score, ["vwap", "volume_profile"])),
        strategy_mode: StrategyMode::Breakout,
        breakout: None,
        htf: None,
    }
}

#[test]
fn eurusd_ranging_window_is_recovery_safe() {
    let classifier = RegimeClassifier::default();
    let readings = IndicatorReadings::regime_only(18.0, 0.0001, Some(0.48), Some(0.25));
    let snapshot = classifier.snapshot_from_readings("EURUSD", Utc::now(), &readings);

    assert_eq!(snapshot.regime, MarketRegime::Ranging);
    assert!(snapshot.recovery_safe);
    assert!(snapshot.recovery_reason.contains("no trend signal"));
}

#[test]
fn recovery_is_unsafe_whenever_a_trend_signal_fires() {
    let classifier = RegimeClassifier::default();
    for (hurst, vhf) in [(0.60, 0.20), (0.50, 0.45), (0.70, 0.60)] {
        let readings = IndicatorReadings::regime_only(18.0, 0.0, Some(hurst), Some(vhf));
        let snapshot = classifier.snapshot_from_readings("EURUSD", Utc::now(), &readings);
        assert!(!snapshot.recovery_safe, "H={hurst} VHF={vhf}");
    }
}

#[tokio::test]
async fn dca_action_resolved_by_profitable_close() {
    let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
    let orch = orchestrator(Arc::clone(&store));

    let payload = RecoveryActionPayload {
        kind: RecoveryKind::Dca,
        ticket: 5001,
        parent_ticket: 5000,
        symbol: "EURUSD".to_string(),
        timestamp: Some(Utc::now() - ChronoDuration::minutes(30)),
        level: 1,
        cost: 1.2,
        duration_minutes: 25.0,
        drawdown: -18.0,
        total_volume: 0.02,
    };
    orch.record_recovery_action(payload).await.unwrap().unwrap();
    orch.record_trade_close(trade_close(5000, 14.0, Some(MarketRegime::Ranging)))
        .await
        .unwrap()
        .unwrap();

    let report = orch.generate_report(7, 1).unwrap();
    let recovery = report.recovery.unwrap();
    let dca = recovery.kind(RecoveryKind::Dca).unwrap();
    assert_eq!(dca.triggered, 1);
    assert_eq!(dca.successful, 1);
    assert_eq!(dca.success_rate, 100.0);
    // one sample is below the verdict minimum
    assert_eq!(dca.verdict, RecoveryVerdict::InsufficientData);

    let grid = recovery.kind(RecoveryKind::Grid).unwrap();
    assert_eq!(grid.triggered, 0);
    assert_eq!(grid.success_rate, 0.0);
    assert_eq!(grid.verdict, RecoveryVerdict::InsufficientData);
}

#[test]
fn high_scores_losing_is_inverted() {
    let mut trades: Vec<TradeRecord> = (0..10)
        .map(|i| scored_trade(i, if i < 3 { 20.0 } else { -15.0 }, 7))
        .collect();
    trades.extend((10..20).map(|i| scored_trade(i, if i < 18 { 20.0 } else { -15.0 }, 4)));

    let metrics = ConfluenceAnalyzer::new(AnalysisConfig::default())
        .analyze(&trades)
        .unwrap();

    assert_eq!(metrics.by_score[&ScoreBucket::SevenPlus].win_rate, 30.0);
    assert_eq!(metrics.by_score[&ScoreBucket::AtMostFour].win_rate, 80.0);
    assert_eq!(metrics.score_correlation, ScoreCorrelation::Inverted);
}

#[test]
fn expired_records_are_absent_on_next_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();

    let stale = MarketSnapshot::unknown("EURUSD", Utc::now() - ChronoDuration::days(8), "stale");
    let fresh = MarketSnapshot::unknown("EURUSD", Utc::now() - ChronoDuration::hours(1), "fresh");
    store.append_market_snapshot(stale).unwrap();
    store.append_market_snapshot(fresh).unwrap();

    let mut old_trade = scored_trade(1, 5.0, 5);
    old_trade.close_time = Utc::now() - ChronoDuration::days(31);
    store.append_trade(old_trade).unwrap();

    let snapshots = store.market_snapshots(&RecordFilter::default()).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].recovery_reason, "fresh");
    assert!(store.trades(&RecordFilter::default()).unwrap().is_empty());

    // a reopened store sees the same pruned collections
    let reopened = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();
    assert_eq!(reopened.statistics().unwrap().market_snapshots, 1);
}

#[tokio::test]
async fn orchestrator_lifecycle_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TimeSeriesStore> =
        Arc::new(JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap());
    let orch = orchestrator(Arc::clone(&store));

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    orch.stop().await;

    let status = orch.status().await;
    assert!(!status.is_running);
    assert!(status.last_analysis_time.is_some());
    let stats = status.store_statistics.unwrap();
    assert!(stats.hourly_snapshots >= 1);
    assert_eq!(stats.market_snapshots, stats.hourly_snapshots);

    let hourly = store.hourly_snapshots(&RecordFilter::default()).unwrap();
    assert!(hourly.iter().all(|h| h.market.len() == 1));
}

#[tokio::test]
async fn report_with_too_few_trades_is_insufficient() {
    let store: Arc<dyn TimeSeriesStore> = Arc::new(InMemoryStore::default());
    let orch = orchestrator(store);
    for ticket in 0..4 {
        orch.record_trade_close(trade_close(ticket, 3.0, None)).await.unwrap().unwrap();
    }

    let report = orch.generate_report(7, 10).unwrap();
    assert!(report.insufficient_data);
    assert_eq!(report.trades_analyzed, 4);
    assert!(report.recommendations.is_empty());
}
