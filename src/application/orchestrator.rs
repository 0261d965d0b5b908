//! Diagnostic Orchestrator
//!
//! Owns the hourly diagnostic loop: classify each tracked symbol, run the
//! performance/recovery/confluence analyzers, merge their output into
//! recommendations and persist one `HourlySnapshot`. Also the ingestion
//! entry point for trade closes and recovery triggers.
//!
//! Lifecycle is `Stopped -> Running` on `start()` and back on `stop()`.
//! Only one cycle runs at a time; `stop()` interrupts the sleep immediately
//! and gives an in-flight cycle `stop_timeout` to finish before aborting it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::recommendations::{merge_recommendations, CycleSections};
use super::render::{export_summary, render_summary};
use super::report::{Report, ReportGenerator};
use crate::analyzers::{
    AnalysisConfig, AnalyzerError, Baseline, ConfluenceAnalyzer, PerformanceAnalyzer,
    RecoveryAnalyzer,
};
use crate::config::Config;
use crate::domain::{
    nearest_by_timestamp, HourlySnapshot, MarketRegime, MarketSnapshot, RecoveryAction,
    RecoveryActionPayload, TradeClosePayload, TradeRecord,
};
use crate::ports::{
    MarketDataError, MarketDataPort, RecordFilter, StoreError, StoreStatistics, TimeSeriesStore,
};
use crate::strategy::{RegimeClassifier, RegimeConfig};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Orchestrator already running")]
    AlreadyRunning,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),
    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Cycle parameters, usually built from the `[diagnostics]` config section
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub bars: usize,
    pub interval: Duration,
    pub error_backoff: Duration,
    pub stop_timeout: Duration,
    pub performance_window: chrono::Duration,
    pub analysis_window: chrono::Duration,
    pub join_tolerance: chrono::Duration,
    pub regime: RegimeConfig,
    pub analysis: AnalysisConfig,
    /// Directory for latest_summary.json, `None` disables the export
    pub summary_dir: Option<PathBuf>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["EURUSD".to_string()],
            timeframe: "H1".to_string(),
            bars: 200,
            interval: Duration::from_secs(3600),
            error_backoff: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(5),
            performance_window: chrono::Duration::hours(24),
            analysis_window: chrono::Duration::days(7),
            join_tolerance: chrono::Duration::minutes(120),
            regime: RegimeConfig::default(),
            analysis: AnalysisConfig::default(),
            summary_dir: None,
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        let d = &config.diagnostics;
        Self {
            symbols: d.symbols.clone(),
            timeframe: d.timeframe.clone(),
            bars: d.bars,
            interval: Duration::from_secs(d.interval_secs),
            error_backoff: Duration::from_secs(d.error_backoff_secs),
            stop_timeout: Duration::from_secs(d.stop_timeout_secs),
            performance_window: chrono::Duration::hours(i64::from(d.performance_window_hours)),
            analysis_window: chrono::Duration::days(i64::from(d.analysis_window_days)),
            join_tolerance: config.storage.join_tolerance(),
            regime: config.regime.clone(),
            analysis: config.analysis.clone(),
            summary_dir: d.export_summary.then(|| config.storage.data_dir()),
        }
    }
}

/// Status snapshot of the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub last_analysis_time: Option<DateTime<Utc>>,
    /// `None` when the store could not be read
    pub store_statistics: Option<StoreStatistics>,
    pub baseline_loaded: bool,
    pub symbols: Vec<String>,
}

/// Hourly diagnostic loop with injected store and market data
pub struct DiagnosticOrchestrator {
    store: Arc<dyn TimeSeriesStore>,
    market_data: Arc<dyn MarketDataPort>,
    classifier: Arc<RegimeClassifier>,
    settings: Arc<OrchestratorSettings>,
    baseline: Option<Arc<Baseline>>,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<watch::Sender<bool>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    cycle_lock: Arc<Mutex<()>>,
    last_analysis_time: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl DiagnosticOrchestrator {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        market_data: Arc<dyn MarketDataPort>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            market_data,
            classifier: Arc::new(RegimeClassifier::new(settings.regime.clone())),
            settings: Arc::new(settings),
            baseline: None,
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(shutdown),
            worker: Arc::new(Mutex::new(None)),
            cycle_lock: Arc::new(Mutex::new(())),
            last_analysis_time: Arc::new(RwLock::new(None)),
        }
    }

    /// Attach baseline statistics for the drawdown/volume comparison
    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = Some(Arc::new(baseline));
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn TimeSeriesStore> {
        Arc::clone(&self.store)
    }

    /// Spawn the periodic worker. The first cycle runs immediately.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut running = self.is_running.write().await;
        if *running {
            return Err(OrchestratorError::AlreadyRunning);
        }
        *running = true;
        self.shutdown.send_replace(false);

        let this = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                let delay = match this.run_cycle().await {
                    Ok(_) => this.settings.interval,
                    Err(e) => {
                        error!("Diagnostic cycle failed: {}", e);
                        this.settings.error_backoff
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            debug!("Diagnostic worker exiting");
        });
        *self.worker.lock().await = Some(handle);

        info!(
            "Diagnostic orchestrator started - symbols: {:?}, provider: {}, interval: {:?}",
            self.settings.symbols,
            self.market_data.name(),
            self.settings.interval
        );
        Ok(())
    }

    /// Stop the worker, waiting at most `stop_timeout` for an in-flight cycle
    pub async fn stop(&self) {
        let mut running = self.is_running.write().await;
        if !*running {
            return;
        }
        self.shutdown.send_replace(true);

        if let Some(mut handle) = self.worker.lock().await.take() {
            match tokio::time::timeout(self.settings.stop_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Diagnostic worker ended abnormally: {}", e),
                Err(_) => {
                    warn!(
                        "Diagnostic cycle did not finish within {:?}, aborting",
                        self.settings.stop_timeout
                    );
                    handle.abort();
                }
            }
        }
        *running = false;
        info!("Diagnostic orchestrator stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Execute one diagnostic cycle and persist its snapshot.
    ///
    /// Symbols whose bars cannot be fetched are skipped and a failing
    /// analyzer only omits its own section. Store failures fail the cycle
    /// and nothing is persisted for it.
    pub async fn run_cycle(&self) -> Result<HourlySnapshot, OrchestratorError> {
        let _cycle = self.cycle_lock.lock().await;
        let now = Utc::now();

        let mut market = Vec::with_capacity(self.settings.symbols.len());
        for symbol in &self.settings.symbols {
            let bars = match self
                .market_data
                .get_historical_bars(symbol, &self.settings.timeframe, self.settings.bars)
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!("Skipping {} this cycle: {}", symbol, e);
                    continue;
                }
            };
            let snapshot = self.classifier.classify(symbol, &bars, now);
            debug!(
                symbol = %snapshot.symbol,
                regime = %snapshot.regime,
                recovery_safe = snapshot.recovery_safe,
                "Classified"
            );
            market.push(snapshot);
        }

        let this = self.clone();
        let snapshot = tokio::task::spawn_blocking(move || this.analyze_and_persist(now, market))
            .await
            .map_err(|e| OrchestratorError::Task(e.to_string()))??;

        *self.last_analysis_time.write().await = Some(now);
        info!("{}", render_summary(&snapshot));
        if let Some(dir) = &self.settings.summary_dir {
            if let Err(e) = export_summary(dir, &snapshot) {
                warn!("Failed to export summary to {}: {}", dir.display(), e);
            }
        }
        Ok(snapshot)
    }

    fn analyze_and_persist(
        &self,
        now: DateTime<Utc>,
        market: Vec<MarketSnapshot>,
    ) -> Result<HourlySnapshot, OrchestratorError> {
        let analysis_start = now - self.settings.analysis_window;
        let performance_start = now - self.settings.performance_window;
        let window = RecordFilter::since(analysis_start).until(now);
        let trades = self.store.trades(&window)?;
        let actions = self.store.recovery_actions(&window)?;

        let analysis = &self.settings.analysis;
        let performance = PerformanceAnalyzer::new(analysis.clone())
            .analyze(&trades, performance_start, now)
            .map_err(|e| error!("Performance analysis skipped: {}", e))
            .ok();
        let recovery = RecoveryAnalyzer::new(analysis.clone())
            .analyze(&actions, &trades, self.baseline.as_deref())
            .map_err(|e| error!("Recovery analysis skipped: {}", e))
            .ok();
        let confluence = ConfluenceAnalyzer::new(analysis.clone())
            .analyze(&trades)
            .map_err(|e| error!("Confluence analysis skipped: {}", e))
            .ok();

        let recommendations = merge_recommendations(CycleSections {
            market: &market,
            performance: performance.as_ref(),
            recovery: recovery.as_ref(),
            confluence: confluence.as_ref(),
        });

        for m in &market {
            self.store.append_market_snapshot(m.clone()).map_err(|e| {
                error!("Failed to persist market snapshot for {}: {}", m.symbol, e);
                e
            })?;
        }

        let snapshot = HourlySnapshot {
            timestamp: now,
            market,
            performance,
            recovery,
            confluence,
            recommendations,
        };
        self.store
            .append_hourly_snapshot(snapshot.clone())
            .map_err(|e| {
                error!("Failed to persist hourly snapshot: {}", e);
                e
            })?;
        Ok(snapshot)
    }

    /// Record a closed position without blocking the caller.
    ///
    /// The returned handle may be dropped. Tags the trade with the nearest
    /// market regime when the payload has none and resolves any recovery
    /// actions linked to its ticket.
    pub fn record_trade_close(
        &self,
        payload: TradeClosePayload,
    ) -> JoinHandle<Result<TradeRecord, OrchestratorError>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let ticket = payload.ticket;
            this.ingest_trade(payload).map_err(|e| {
                error!("Failed to record trade {}: {}", ticket, e);
                e
            })
        })
    }

    fn ingest_trade(&self, payload: TradeClosePayload) -> Result<TradeRecord, OrchestratorError> {
        if !payload.profit.is_finite() {
            return Err(OrchestratorError::InvalidPayload(format!(
                "trade {} has non-finite profit",
                payload.ticket
            )));
        }
        if payload.close_time < payload.open_time {
            return Err(OrchestratorError::InvalidPayload(format!(
                "trade {} closes before it opens",
                payload.ticket
            )));
        }

        let regime = match payload.market_regime {
            Some(regime) => regime,
            None => self.regime_at(&payload.symbol, payload.open_time)?,
        };
        let record = payload.into_record(regime);
        self.store.append_trade(record.clone())?;

        let resolved = self.store.resolve_recovery(record.ticket, record.is_win())?;
        info!(
            ticket = record.ticket,
            symbol = %record.symbol,
            profit = record.profit,
            regime = %record.market_regime,
            resolved_recovery = resolved,
            "Trade recorded"
        );
        Ok(record)
    }

    /// Regime of the nearest same-symbol snapshot within the join tolerance
    fn regime_at(&self, symbol: &str, at: DateTime<Utc>) -> Result<MarketRegime, OrchestratorError> {
        let tolerance = self.settings.join_tolerance;
        let filter = RecordFilter::since(at - tolerance)
            .until(at + tolerance)
            .with_symbol(symbol);
        let candidates = self.store.market_snapshots(&filter)?;
        Ok(nearest_by_timestamp(at, &candidates, |s| s.timestamp, tolerance)
            .map(|s| s.regime)
            .unwrap_or(MarketRegime::Unknown))
    }

    /// Record a recovery trigger without blocking the caller.
    ///
    /// An action whose position (or parent) already closed is resolved
    /// against the stored trade right away.
    pub fn record_recovery_action(
        &self,
        payload: RecoveryActionPayload,
    ) -> JoinHandle<Result<RecoveryAction, OrchestratorError>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let ticket = payload.ticket;
            this.ingest_recovery_action(payload).map_err(|e| {
                error!("Failed to record recovery action {}: {}", ticket, e);
                e
            })
        })
    }

    fn ingest_recovery_action(
        &self,
        payload: RecoveryActionPayload,
    ) -> Result<RecoveryAction, OrchestratorError> {
        let mut action = payload.into_action(Utc::now());
        for (name, v) in [
            ("cost", action.cost),
            ("drawdown", action.drawdown),
            ("volume", action.total_volume),
        ] {
            if !v.is_finite() {
                return Err(OrchestratorError::InvalidPayload(format!(
                    "recovery action {} has non-finite {}",
                    action.ticket, name
                )));
            }
        }

        // Append before the lookup so a trade ingested concurrently either
        // sees this action or is seen by it.
        self.store.append_recovery_action(action.clone())?;
        if let Some(trade) = self.closed_trade_for(&action)? {
            self.store.resolve_recovery(trade.ticket, trade.is_win())?;
            action.recovered = Some(trade.is_win());
        }

        info!(
            kind = %action.kind,
            ticket = action.ticket,
            parent = action.parent_ticket,
            level = action.level,
            recovered = ?action.recovered,
            "Recovery action recorded"
        );
        Ok(action)
    }

    /// Stored trade closing the action's own position, else its parent
    fn closed_trade_for(
        &self,
        action: &RecoveryAction,
    ) -> Result<Option<TradeRecord>, OrchestratorError> {
        for ticket in [action.ticket, action.parent_ticket] {
            let mut trades = self.store.trades(&RecordFilter::default().with_ticket(ticket))?;
            if let Some(trade) = trades.pop() {
                return Ok(Some(trade));
            }
        }
        Ok(None)
    }

    /// Get current status snapshot
    pub async fn status(&self) -> OrchestratorStatus {
        let store_statistics = match self.store.statistics() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Store statistics unavailable: {}", e);
                None
            }
        };
        OrchestratorStatus {
            is_running: *self.is_running.read().await,
            last_analysis_time: *self.last_analysis_time.read().await,
            store_statistics,
            baseline_loaded: self.baseline.is_some(),
            symbols: self.settings.symbols.clone(),
        }
    }

    pub fn report_generator(&self) -> ReportGenerator {
        ReportGenerator::new(Arc::clone(&self.store), self.settings.analysis.clone())
            .with_join_tolerance(self.settings.join_tolerance)
            .with_baseline(self.baseline.clone())
    }

    /// Deep analysis over the last `days` days
    pub fn generate_report(&self, days: u32, min_trades: usize) -> Result<Report, OrchestratorError> {
        self.report_generator().generate_report(days, min_trades)
    }
}

// Shares all state, so clones observe the same lifecycle
impl Clone for DiagnosticOrchestrator {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            market_data: Arc::clone(&self.market_data),
            classifier: Arc::clone(&self.classifier),
            settings: Arc::clone(&self.settings),
            baseline: self.baseline.clone(),
            is_running: Arc::clone(&self.is_running),
            shutdown: Arc::clone(&self.shutdown),
            worker: Arc::clone(&self.worker),
            cycle_lock: Arc::clone(&self.cycle_lock),
            last_analysis_time: Arc::clone(&self.last_analysis_time),
        }
    }
}
