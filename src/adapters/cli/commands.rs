//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the regime-sentinel monitor.

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::adapters::market_data::{JsonBarsProvider, SyntheticMarketData};
use crate::adapters::store::JsonFileStore;
use crate::analyzers::Baseline;
use crate::application::{
    render_report, render_summary, DiagnosticOrchestrator, OrchestratorSettings,
    OrchestratorStatus, ReportGenerator,
};
use crate::config::{load_config, Config};
use crate::domain::AgentEvent;
use crate::ports::{MarketDataPort, RecordFilter, TimeSeriesStore};
use crate::strategy::RegimeClassifier;

const DEFAULT_CONFIG: &str = "config/diagnostics.toml";

/// Regime Sentinel - self-diagnosing monitor for a recovery-based trading agent
#[derive(Parser, Debug)]
#[command(
    name = "regime-sentinel",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Regime detection and recovery/confluence diagnostics for a trading agent",
    long_about = "Regime Sentinel classifies market regimes (ADX, Hurst, VHF) every hour, \
                  measures whether grid/hedge/DCA recovery and confluence scoring actually \
                  work, and emits prioritized recommendations."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the hourly diagnostic loop
    Run(RunCmd),

    /// Deep report over a lookback window
    Report(ReportCmd),

    /// Show stored record counts and last cycle time
    Status(StatusCmd),

    /// Classify the current regime once and print it
    Classify(ClassifyCmd),

    /// Record trade closes and recovery actions from a JSON-lines event log
    Ingest(IngestCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Report(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::Classify(cmd) => &cmd.config,
            Command::Ingest(cmd) => &cmd.config,
        }
    }
}

/// Start the diagnostic loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Use random-walk bars instead of the exported bar files
    #[arg(long)]
    pub synthetic: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Generate a deep report
#[derive(Parser, Debug)]
pub struct ReportCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Lookback window in days
    #[arg(short, long, value_name = "DAYS", default_value = "7")]
    pub days: u32,

    /// Minimum trades required for a meaningful report
    #[arg(long, value_name = "N", default_value = "10")]
    pub min_trades: usize,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show monitor status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Print status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Classify current market regime
#[derive(Parser, Debug)]
pub struct ClassifyCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Symbol to classify (defaults to all configured symbols)
    #[arg(short, long, value_name = "SYMBOL")]
    pub symbol: Option<String>,

    /// Use random-walk bars instead of the exported bar files
    #[arg(long)]
    pub synthetic: bool,
}

/// Ingest agent events
#[derive(Parser, Debug)]
pub struct IngestCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Event log with one JSON object per line; reads stdin when omitted or "-"
    #[arg(value_name = "EVENTS")]
    pub input: Option<PathBuf>,
}

/// Execute the parsed command
pub async fn execute(app: CliApp) -> Result<()> {
    let path = app.command.config_path().to_path_buf();
    let config = load_config(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()));

    // Initialize logging based on flags, falling back to the config level
    let level = config.as_ref().ok().map(|c| c.logging.level.clone());
    init_logging(app.verbose, app.debug, level.as_deref())?;
    let config = config?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Report(cmd) => report_command(cmd, config),
        Command::Status(cmd) => status_command(cmd, config),
        Command::Classify(cmd) => classify_command(cmd, config).await,
        Command::Ingest(cmd) => ingest_command(cmd, config).await,
    }
}

/// Initialize logging system
pub fn init_logging(verbose: bool, debug: bool, config_level: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config_level.unwrap_or("warn")))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<JsonFileStore>> {
    let dir = config.storage.data_dir();
    let store = JsonFileStore::open(&dir, config.storage.retention())
        .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn load_baseline(config: &Config) -> Result<Option<Baseline>> {
    let Some(path) = config.storage.baseline_path() else {
        return Ok(None);
    };
    let baseline = Baseline::load(&path)
        .with_context(|| format!("Failed to read baseline {}", path.display()))?;
    if baseline.is_none() {
        tracing::warn!("Baseline file {} not found - skipping comparison", path.display());
    }
    Ok(baseline)
}

fn market_data(config: &Config, synthetic: bool) -> Arc<dyn MarketDataPort> {
    if synthetic {
        tracing::warn!("Using SYNTHETIC market data - regimes are not real");
        Arc::new(SyntheticMarketData::new(config.market_data.synthetic_seed))
    } else {
        Arc::new(JsonBarsProvider::new(config.market_data.bars_dir()))
    }
}

/// Handle run command
async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    tracing::info!("Starting regime-sentinel...");
    tracing::info!("Config: {}", cmd.config.display());

    let store = open_store(&config)?;
    let mut orchestrator = DiagnosticOrchestrator::new(
        store,
        market_data(&config, cmd.synthetic),
        OrchestratorSettings::from(&config),
    );
    if let Some(baseline) = load_baseline(&config)? {
        orchestrator = orchestrator.with_baseline(baseline);
    }

    if cmd.once {
        let snapshot = orchestrator
            .run_cycle()
            .await
            .context("Diagnostic cycle failed")?;
        println!("{}", render_summary(&snapshot));
        return Ok(());
    }

    orchestrator
        .start()
        .await
        .context("Failed to start orchestrator")?;
    println!("regime-sentinel running - press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Received Ctrl+C, shutting down...");
    orchestrator.stop().await;
    Ok(())
}

/// Handle report command
fn report_command(cmd: ReportCmd, config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let generator = ReportGenerator::new(store, config.analysis.clone())
        .with_join_tolerance(config.storage.join_tolerance())
        .with_baseline(load_baseline(&config)?.map(Arc::new));

    let report = generator
        .generate_report(cmd.days, cmd.min_trades)
        .context("Failed to generate report")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }
    Ok(())
}

/// Handle status command
fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let stats = store.statistics().context("Failed to read store statistics")?;
    let last_analysis_time = store
        .hourly_snapshots(&RecordFilter::default())
        .context("Failed to read hourly snapshots")?
        .iter()
        .map(|s| s.timestamp)
        .max();

    let status = OrchestratorStatus {
        is_running: false,
        last_analysis_time,
        store_statistics: Some(stats.clone()),
        baseline_loaded: load_baseline(&config)?.is_some(),
        symbols: config.diagnostics.symbols.clone(),
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("=== regime-sentinel status ===");
    println!("Data dir:          {}", config.storage.data_dir().display());
    println!("Symbols:           {}", status.symbols.join(", "));
    match status.last_analysis_time {
        Some(t) => println!(
            "Last cycle:        {} ({} min ago)",
            t.format("%Y-%m-%d %H:%M UTC"),
            (Utc::now() - t).num_minutes()
        ),
        None => println!("Last cycle:        never"),
    }
    println!("Baseline loaded:   {}", status.baseline_loaded);
    println!("Market snapshots:  {}", stats.market_snapshots);
    println!("Trades:            {}", stats.trades);
    println!(
        "Recovery actions:  {} ({} pending)",
        stats.recovery_actions, stats.pending_recovery_actions
    );
    println!("Hourly snapshots:  {}", stats.hourly_snapshots);
    Ok(())
}

/// Handle classify command
async fn classify_command(cmd: ClassifyCmd, config: Config) -> Result<()> {
    let provider = market_data(&config, cmd.synthetic);
    let classifier = RegimeClassifier::new(config.regime.clone());
    let symbols = match cmd.symbol {
        Some(symbol) => vec![symbol],
        None => config.diagnostics.symbols.clone(),
    };

    for symbol in symbols {
        let bars = provider
            .get_historical_bars(&symbol, &config.diagnostics.timeframe, config.diagnostics.bars)
            .await
            .with_context(|| format!("Failed to fetch bars for {}", symbol))?;
        let s = classifier.classify(&symbol, &bars, Utc::now());

        println!("{} ({} bars from {})", s.symbol, bars.len(), provider.name());
        println!("  Regime:       {} (confidence {:.2})", s.regime, s.regime_confidence);
        println!("  Statistical:  {}", s.statistical_regime);
        println!("  ADX:          {:.2}  EMA slope: {:.6}", s.adx, s.ema_slope);
        println!(
            "  Hurst:        {}",
            s.hurst.map_or("n/a".to_string(), |h| format!("{:.3}", h))
        );
        println!(
            "  VHF:          {} ({})",
            s.vhf.map_or("n/a".to_string(), |v| format!("{:.3}", v)),
            s.vhf_trend.map_or("n/a".to_string(), |t| format!("{:?}", t))
        );
        println!("  ATR:          {:.5}  BB width: {:.2}%  vol pct: {:.0}", s.atr, s.bb_width, s.volatility_percentile);
        println!(
            "  Recovery:     {} - {}",
            if s.recovery_safe { "SAFE" } else { "BLOCKED" },
            s.recovery_reason
        );
    }
    Ok(())
}

/// Parse one event-log line. Blank lines and `#` comments yield `None`.
fn parse_event_line(line: &str) -> Option<serde_json::Result<AgentEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Handle ingest command
///
/// Events are applied in file order so a recovery action listed after its
/// trade is resolved on arrival.
async fn ingest_command(cmd: IngestCmd, config: Config) -> Result<()> {
    let reader: Box<dyn BufRead> = match cmd.input.as_deref() {
        None => Box::new(io::stdin().lock()),
        Some(path) if path == Path::new("-") => Box::new(io::stdin().lock()),
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open event log {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
    };

    let store = open_store(&config)?;
    let orchestrator =
        DiagnosticOrchestrator::new(store, market_data(&config, false), OrchestratorSettings::from(&config));

    let (mut trades, mut actions, mut rejected) = (0usize, 0usize, 0usize);
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event log")?;
        let event = match parse_event_line(&line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!("Skipping line {}: {}", index + 1, e);
                rejected += 1;
                continue;
            }
        };
        // failures are already logged by the orchestrator
        match event {
            AgentEvent::TradeClose(payload) => {
                match orchestrator.record_trade_close(payload).await.context("Ingest task failed")? {
                    Ok(_) => trades += 1,
                    Err(_) => rejected += 1,
                }
            }
            AgentEvent::RecoveryAction(payload) => {
                match orchestrator.record_recovery_action(payload).await.context("Ingest task failed")? {
                    Ok(_) => actions += 1,
                    Err(_) => rejected += 1,
                }
            }
        }
    }

    println!(
        "Ingested {} trades and {} recovery actions ({} lines rejected)",
        trades, actions, rejected
    );
    Ok(())
}
