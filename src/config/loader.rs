//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/diagnostics.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyzers::AnalysisConfig;
use crate::ports::RetentionPolicy;
use crate::strategy::RegimeConfig;

/// Main configuration structure matching config/diagnostics.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub diagnostics: DiagnosticsSection,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub market_data: MarketDataSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Hourly cycle configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    /// Symbols classified every cycle
    pub symbols: Vec<String>,
    /// Bar resolution requested from the market data provider
    pub timeframe: String,
    /// Bars requested per symbol (must cover regime.min_bars)
    pub bars: usize,
    /// Seconds between cycles
    pub interval_secs: u64,
    /// Pause after a failed cycle
    pub error_backoff_secs: u64,
    /// How long stop() waits for an in-flight cycle
    pub stop_timeout_secs: u64,
    pub performance_window_hours: u32,
    /// Window for recovery and confluence analysis
    pub analysis_window_days: u32,
    /// Write latest_summary.json after each cycle
    pub export_summary: bool,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            symbols: vec!["EURUSD".to_string()],
            timeframe: "H1".to_string(),
            bars: 200,
            interval_secs: 3600,
            error_backoff_secs: 60,
            stop_timeout_secs: 5,
            performance_window_hours: 24,
            analysis_window_days: 7,
            export_summary: true,
        }
    }
}

/// Persistence configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the four JSON collections
    pub data_dir: String,
    /// Optional baseline statistics for the drawdown comparison
    pub baseline_path: Option<String>,
    pub market_snapshot_days: u32,
    pub trade_days: u32,
    pub recovery_days: u32,
    pub hourly_snapshot_days: u32,
    /// Max distance between a trade's open time and its market snapshot
    pub join_tolerance_minutes: i64,
}

impl Default for StorageSection {
    fn default() -> Self {
        let retention = RetentionPolicy::default();
        Self {
            data_dir: "data/diagnostics".to_string(),
            baseline_path: None,
            market_snapshot_days: retention.market_snapshot_days,
            trade_days: retention.trade_days,
            recovery_days: retention.recovery_days,
            hourly_snapshot_days: retention.hourly_snapshot_days,
            join_tolerance_minutes: 120,
        }
    }
}

impl StorageSection {
    /// Data directory with `~` and env vars expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn baseline_path(&self) -> Option<PathBuf> {
        self.baseline_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(expand_path)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            market_snapshot_days: self.market_snapshot_days,
            trade_days: self.trade_days,
            recovery_days: self.recovery_days,
            hourly_snapshot_days: self.hourly_snapshot_days,
        }
    }

    pub fn join_tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.join_tolerance_minutes)
    }
}

/// Market data configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataSection {
    /// Directory of `<SYMBOL>_<TIMEFRAME>.json` bar exports
    pub bars_dir: String,
    /// Seed for the synthetic provider
    pub synthetic_seed: u64,
}

impl Default for MarketDataSection {
    fn default() -> Self {
        Self {
            bars_dir: "data/bars".to_string(),
            synthetic_seed: 42,
        }
    }
}

impl MarketDataSection {
    pub fn bars_dir(&self) -> PathBuf {
        expand_path(&self.bars_dir)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), ConfigError> {
    if value <= 0.0 || value >= 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "{} must be in (0, 1), got {}",
            name, value
        )));
    }
    Ok(())
}

fn non_zero(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ValidationError(format!("{} must be > 0", name)));
    }
    Ok(())
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate diagnostics section
        let d = &self.diagnostics;
        if d.symbols.is_empty() || d.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "symbols cannot be empty".to_string(),
            ));
        }
        if d.timeframe.is_empty() {
            return Err(ConfigError::ValidationError(
                "timeframe cannot be empty".to_string(),
            ));
        }
        non_zero("interval_secs", d.interval_secs)?;
        non_zero("error_backoff_secs", d.error_backoff_secs)?;
        non_zero("performance_window_hours", d.performance_window_hours as u64)?;
        non_zero("analysis_window_days", d.analysis_window_days as u64)?;
        if d.bars < self.regime.min_bars {
            return Err(ConfigError::ValidationError(format!(
                "bars ({}) must be >= regime.min_bars ({})",
                d.bars, self.regime.min_bars
            )));
        }

        // Validate regime section
        let r = &self.regime;
        for (name, period) in [
            ("adx_period", r.adx_period),
            ("ema_period", r.ema_period),
            ("atr_period", r.atr_period),
            ("bb_period", r.bb_period),
            ("hurst_period", r.hurst_period),
            ("vhf_period", r.vhf_period),
            ("min_bars", r.min_bars),
        ] {
            non_zero(name, period as u64)?;
        }
        unit_interval("hurst_trending", r.hurst_trending)?;
        unit_interval("hurst_ranging", r.hurst_ranging)?;
        unit_interval("vhf_trending", r.vhf_trending)?;
        unit_interval("vhf_ranging", r.vhf_ranging)?;
        if r.hurst_ranging >= r.hurst_trending {
            return Err(ConfigError::ValidationError(format!(
                "hurst_ranging ({}) must be below hurst_trending ({})",
                r.hurst_ranging, r.hurst_trending
            )));
        }
        if r.vhf_ranging >= r.vhf_trending {
            return Err(ConfigError::ValidationError(format!(
                "vhf_ranging ({}) must be below vhf_trending ({})",
                r.vhf_ranging, r.vhf_trending
            )));
        }

        // Validate analysis section
        let a = &self.analysis;
        if a.large_loss_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "large_loss_threshold must be > 0, got {}",
                a.large_loss_threshold
            )));
        }
        if a.factor_removal_win_rate < 0.0 || a.factor_removal_win_rate > 100.0 {
            return Err(ConfigError::ValidationError(format!(
                "factor_removal_win_rate must be 0-100, got {}",
                a.factor_removal_win_rate
            )));
        }

        // Validate storage
        let s = &self.storage;
        if s.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }
        for (name, days) in [
            ("market_snapshot_days", s.market_snapshot_days),
            ("trade_days", s.trade_days),
            ("recovery_days", s.recovery_days),
            ("hourly_snapshot_days", s.hourly_snapshot_days),
        ] {
            non_zero(name, days as u64)?;
        }
        if s.join_tolerance_minutes <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "join_tolerance_minutes must be > 0, got {}",
                s.join_tolerance_minutes
            )));
        }

        Ok(())
    }
}
