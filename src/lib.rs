//! Regime Sentinel - self-diagnosing monitor for a recovery-based trading agent
//!
//! Classifies market regimes every hour and measures whether the agent's
//! recovery mechanisms (grid, hedge, DCA) and confluence scoring actually work.
//!
//! # Modules
//!
//! - `domain`: Record types (MarketSnapshot, TradeRecord, RecoveryAction, HourlySnapshot)
//! - `ports`: Trait abstractions (MarketDataPort, TimeSeriesStore)
//! - `strategy`: Regime detection (Wilder ADX, Hurst R/S, VHF, RegimeClassifier)
//! - `analyzers`: Performance, recovery, confluence and regime-accuracy analysis
//! - `adapters`: Stores, market data providers, CLI
//! - `config`: Configuration loading and validation
//! - `application`: DiagnosticOrchestrator and report generation

pub mod adapters;
pub mod analyzers;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;

pub use application::{DiagnosticOrchestrator, OrchestratorError, OrchestratorSettings, Report, ReportGenerator};
pub use config::{load_config, Config};
