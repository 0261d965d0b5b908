//! Diagnostic Records
//!
//! Typed records for the four persisted collections: market snapshots,
//! trade outcomes, recovery actions and (in `snapshot.rs`) hourly snapshots.
//! Optional metadata (confluence, regime at open) is modelled with `Option`
//! rather than missing keys.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Discrete market regime derived from ADX and EMA slope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// ADX < 20: weak trend, mean reversion safe
    Ranging,
    /// ADX 20-25: transitional zone
    Choppy,
    /// ADX >= 25 with rising EMA
    TrendingUp,
    /// ADX >= 25 with falling EMA
    TrendingDown,
    /// ADX >= 25 with flat EMA
    TrendingSideways,
    /// Not enough data
    #[serde(other)]
    Unknown,
}

impl MarketRegime {
    /// Classify from ADX strength and EMA slope direction
    pub fn from_adx(adx: f64, ema_slope: f64) -> Self {
        if !adx.is_finite() {
            return Self::Unknown;
        }
        if adx < 20.0 {
            Self::Ranging
        } else if adx < 25.0 {
            Self::Choppy
        } else if ema_slope > 0.0 {
            Self::TrendingUp
        } else if ema_slope < 0.0 {
            Self::TrendingDown
        } else {
            Self::TrendingSideways
        }
    }

    pub fn is_trending(&self) -> bool {
        matches!(self, Self::TrendingUp | Self::TrendingDown | Self::TrendingSideways)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ranging => "ranging",
            Self::Choppy => "choppy",
            Self::TrendingUp => "trending_up",
            Self::TrendingDown => "trending_down",
            Self::TrendingSideways => "trending_sideways",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Regime from the fractal/statistical signals (Hurst + VHF)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticalRegime {
    Ranging,
    Trending,
    Choppy,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for StatisticalRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ranging => "ranging",
            Self::Trending => "trending",
            Self::Choppy => "choppy",
            Self::Unknown => "unknown",
        };
        f.pad(s)
    }
}

/// Direction of VHF over the last three windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VhfTrend {
    Rising,
    Falling,
    Stable,
}

/// Point-in-time market classification for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub atr: f64,
    /// Bollinger band width as percent of the middle band
    pub bb_width: f64,
    /// Current ATR percentile against the window's ATR history (0-100)
    pub volatility_percentile: f64,
    pub adx: f64,
    pub ema_slope: f64,
    pub hurst: Option<f64>,
    pub vhf: Option<f64>,
    pub vhf_trend: Option<VhfTrend>,
    pub regime: MarketRegime,
    pub statistical_regime: StatisticalRegime,
    /// Confidence of the statistical regime (0-1)
    pub regime_confidence: f64,
    pub recovery_safe: bool,
    pub recovery_reason: String,
}

impl MarketSnapshot {
    /// Zero-confidence snapshot used when the price window is too short
    pub fn unknown(symbol: impl Into<String>, timestamp: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            atr: 0.0,
            bb_width: 0.0,
            volatility_percentile: 50.0,
            adx: 0.0,
            ema_slope: 0.0,
            hurst: None,
            vhf: None,
            vhf_trend: None,
            regime: MarketRegime::Unknown,
            statistical_regime: StatisticalRegime::Unknown,
            regime_confidence: 0.0,
            recovery_safe: false,
            recovery_reason: reason.into(),
        }
    }
}

/// Entry logic that opened the position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    Breakout,
    MeanReversion,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Breakout => "breakout",
            Self::MeanReversion => "mean_reversion",
            Self::Unknown => "unknown",
        };
        f.pad(s)
    }
}

/// Confluence metadata captured at entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfluenceInfo {
    pub score: u32,
    pub factors: BTreeSet<String>,
}

impl ConfluenceInfo {
    pub fn new<I, S>(score: u32, factors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            score,
            factors: factors.into_iter().map(Into::into).collect(),
        }
    }
}

/// Level-break context for breakout entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakoutInfo {
    pub is_breakout: bool,
    #[serde(default)]
    pub levels_broken: u32,
}

/// Higher-timeframe agreement at entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HtfSignals {
    /// 0 when no higher-timeframe signal contributed
    pub score: u32,
}

/// Closed position outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: u64,
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub profit: f64,
    pub duration_minutes: f64,
    /// Regime in force when the position opened
    pub market_regime: MarketRegime,
    #[serde(default)]
    pub confluence: Option<ConfluenceInfo>,
    #[serde(default)]
    pub strategy_mode: StrategyMode,
    #[serde(default)]
    pub breakout: Option<BreakoutInfo>,
    #[serde(default)]
    pub htf: Option<HtfSignals>,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }

    /// Hour of day (UTC) the trade closed
    pub fn close_hour(&self) -> u32 {
        self.close_time.hour()
    }
}

/// Loss-recovery mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    Grid,
    Hedge,
    Dca,
    /// Recovery refused by the regime gate
    Blocked,
}

impl RecoveryKind {
    /// The three mechanisms that actually place orders
    pub const MECHANISMS: [RecoveryKind; 3] = [RecoveryKind::Grid, RecoveryKind::Hedge, RecoveryKind::Dca];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Hedge => "hedge",
            Self::Dca => "dca",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RecoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One recovery trigger within a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub kind: RecoveryKind,
    pub ticket: u64,
    /// Original position this action is recovering
    pub parent_ticket: u64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Stack depth (1..N)
    pub level: u32,
    pub cost: f64,
    pub duration_minutes: f64,
    /// Floating drawdown when the action triggered
    pub drawdown: f64,
    /// Cumulative stack volume in lots
    pub total_volume: f64,
    /// `None` until the stack closes and a matching trade is recorded
    #[serde(default)]
    pub recovered: Option<bool>,
}

impl RecoveryAction {
    /// True if `trade` closes this action's position or its parent
    pub fn resolves_with(&self, trade_ticket: u64) -> bool {
        self.ticket == trade_ticket || self.parent_ticket == trade_ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_regime_from_adx_buckets() {
        assert_eq!(MarketRegime::from_adx(5.0, 1.0), MarketRegime::Ranging);
        assert_eq!(MarketRegime::from_adx(19.99, -3.0), MarketRegime::Ranging);
        assert_eq!(MarketRegime::from_adx(20.0, 1.0), MarketRegime::Choppy);
        assert_eq!(MarketRegime::from_adx(24.9, -1.0), MarketRegime::Choppy);
        assert_eq!(MarketRegime::from_adx(25.0, 0.2), MarketRegime::TrendingUp);
        assert_eq!(MarketRegime::from_adx(60.0, -0.2), MarketRegime::TrendingDown);
        assert_eq!(MarketRegime::from_adx(30.0, 0.0), MarketRegime::TrendingSideways);
        assert_eq!(MarketRegime::from_adx(f64::NAN, 1.0), MarketRegime::Unknown);
    }

    #[test]
    fn test_ranging_for_every_low_adx() {
        let mut adx = 0.0;
        while adx < 20.0 {
            for slope in [-5.0, 0.0, 5.0] {
                assert_eq!(MarketRegime::from_adx(adx, slope), MarketRegime::Ranging);
            }
            adx += 0.25;
        }
    }

    #[test]
    fn test_trending_direction_for_every_high_adx() {
        let mut adx = 25.0;
        while adx <= 100.0 {
            assert_eq!(MarketRegime::from_adx(adx, 0.001), MarketRegime::TrendingUp);
            assert_eq!(MarketRegime::from_adx(adx, -0.001), MarketRegime::TrendingDown);
            adx += 0.5;
        }
    }

    #[test]
    fn test_strategy_mode_unknown_fallback() {
        let mode: StrategyMode = serde_json::from_str("\"scalping\"").unwrap();
        assert_eq!(mode, StrategyMode::Unknown);
        let mode: StrategyMode = serde_json::from_str("\"mean_reversion\"").unwrap();
        assert_eq!(mode, StrategyMode::MeanReversion);
    }

    #[test]
    fn test_trade_without_confluence_deserializes() {
        let json = r#"{
            "ticket": 7,
            "symbol": "EURUSD",
            "open_time": "2026-01-01T10:00:00Z",
            "close_time": "2026-01-01T12:30:00Z",
            "profit": -12.5,
            "duration_minutes": 150.0,
            "market_regime": "ranging"
        }"#;
        let trade: TradeRecord = serde_json::from_str(json).unwrap();
        assert!(trade.confluence.is_none());
        assert_eq!(trade.strategy_mode, StrategyMode::Unknown);
        assert!(!trade.is_win());
        assert_eq!(trade.close_hour(), 12);
    }

    #[test]
    fn test_recovery_resolves_with_ticket_or_parent() {
        let action = RecoveryAction {
            kind: RecoveryKind::Dca,
            ticket: 11,
            parent_ticket: 10,
            symbol: "EURUSD".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            level: 1,
            cost: 2.0,
            duration_minutes: 30.0,
            drawdown: -40.0,
            total_volume: 0.2,
            recovered: None,
        };
        assert!(action.resolves_with(10));
        assert!(action.resolves_with(11));
        assert!(!action.resolves_with(12));
    }

    #[test]
    fn test_confluence_factors_are_ordered_and_deduplicated() {
        let info = ConfluenceInfo::new(5, ["vwap_bias", "lvn_proximity", "vwap_bias"]);
        let factors: Vec<_> = info.factors.iter().cloned().collect();
        assert_eq!(factors, vec!["lvn_proximity".to_string(), "vwap_bias".to_string()]);
    }
}
