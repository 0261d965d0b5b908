//! Hourly snapshot and ingestion payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recommendation::Recommendation;
use super::records::{
    BreakoutInfo, ConfluenceInfo, HtfSignals, MarketRegime, MarketSnapshot, RecoveryAction,
    RecoveryKind, StrategyMode, TradeRecord,
};
use crate::analyzers::{ConfluenceMetrics, PerformanceMetrics, RecoveryMetrics};

/// Result of one diagnostic cycle.
///
/// An analyzer section is `None` when that analyzer failed during the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySnapshot {
    pub timestamp: DateTime<Utc>,
    pub market: Vec<MarketSnapshot>,
    pub performance: Option<PerformanceMetrics>,
    pub recovery: Option<RecoveryMetrics>,
    pub confluence: Option<ConfluenceMetrics>,
    pub recommendations: Vec<Recommendation>,
}

/// Position-close event handed over by the trading agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeClosePayload {
    pub ticket: u64,
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub profit: f64,
    /// Regime at open if the agent tracked it; otherwise looked up from snapshots
    #[serde(default)]
    pub market_regime: Option<MarketRegime>,
    #[serde(default)]
    pub confluence: Option<ConfluenceInfo>,
    #[serde(default)]
    pub strategy_mode: Option<StrategyMode>,
    #[serde(default)]
    pub breakout: Option<BreakoutInfo>,
    #[serde(default)]
    pub htf: Option<HtfSignals>,
}

impl TradeClosePayload {
    pub fn into_record(self, regime: MarketRegime) -> TradeRecord {
        let duration_minutes = (self.close_time - self.open_time).num_seconds().max(0) as f64 / 60.0;
        TradeRecord {
            ticket: self.ticket,
            symbol: self.symbol,
            open_time: self.open_time,
            close_time: self.close_time,
            profit: self.profit,
            duration_minutes,
            market_regime: self.market_regime.unwrap_or(regime),
            confluence: self.confluence,
            strategy_mode: self.strategy_mode.unwrap_or_default(),
            breakout: self.breakout,
            htf: self.htf,
        }
    }
}

/// Recovery-trigger event handed over by the trading agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryActionPayload {
    pub kind: RecoveryKind,
    pub ticket: u64,
    pub parent_ticket: u64,
    pub symbol: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub level: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub duration_minutes: f64,
    #[serde(default)]
    pub drawdown: f64,
    #[serde(default)]
    pub total_volume: f64,
}

impl RecoveryActionPayload {
    pub fn into_action(self, now: DateTime<Utc>) -> RecoveryAction {
        RecoveryAction {
            kind: self.kind,
            ticket: self.ticket,
            parent_ticket: self.parent_ticket,
            symbol: self.symbol,
            timestamp: self.timestamp.unwrap_or(now),
            level: self.level,
            cost: self.cost,
            duration_minutes: self.duration_minutes,
            drawdown: self.drawdown,
            total_volume: self.total_volume,
            recovered: None,
        }
    }
}

/// One line of an agent event log, tagged by `"event"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    TradeClose(TradeClosePayload),
    RecoveryAction(RecoveryActionPayload),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trade_payload_prefers_own_regime() {
        let payload = TradeClosePayload {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            open_time: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
            close_time: Utc.with_ymd_and_hms(2026, 1, 5, 10, 30, 0).unwrap(),
            profit: 4.0,
            market_regime: Some(MarketRegime::Choppy),
            confluence: None,
            strategy_mode: None,
            breakout: None,
            htf: None,
        };
        let record = payload.into_record(MarketRegime::Ranging);
        assert_eq!(record.market_regime, MarketRegime::Choppy);
        assert_eq!(record.duration_minutes, 90.0);
        assert_eq!(record.strategy_mode, StrategyMode::Unknown);
    }

    #[test]
    fn test_recovery_payload_defaults_timestamp_and_pending() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let payload: RecoveryActionPayload = serde_json::from_str(
            r#"{"kind":"grid","ticket":5,"parent_ticket":4,"symbol":"GBPUSD","level":2}"#,
        )
        .unwrap();
        let action = payload.into_action(now);
        assert_eq!(action.timestamp, now);
        assert_eq!(action.recovered, None);
        assert_eq!(action.kind, RecoveryKind::Grid);
    }

    #[test]
    fn test_agent_event_tagged_by_event_field() {
        let line = r#"{"event":"recovery_action","kind":"dca","ticket":9,"parent_ticket":8,"symbol":"EURUSD","level":1}"#;
        match serde_json::from_str::<AgentEvent>(line).unwrap() {
            AgentEvent::RecoveryAction(p) => {
                assert_eq!(p.kind, RecoveryKind::Dca);
                assert_eq!(p.parent_ticket, 8);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let line = r#"{"event":"trade_close","ticket":8,"symbol":"EURUSD","open_time":"2026-01-05T09:00:00Z","close_time":"2026-01-05T10:00:00Z","profit":-3.5,"breakout":{"is_breakout":true,"levels_broken":2}}"#;
        match serde_json::from_str::<AgentEvent>(line).unwrap() {
            AgentEvent::TradeClose(p) => {
                assert_eq!(p.ticket, 8);
                assert_eq!(p.breakout.map(|b| b.levels_broken), Some(2));
                assert!(p.market_regime.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
