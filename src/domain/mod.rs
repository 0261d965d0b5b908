//! Domain Layer - Diagnostic records and recommendations
//!
//! Pure data types with no I/O. Everything that touches disk or the
//! market-data feed lives behind the ports layer.
//!
//! - `records`: market snapshots, trade outcomes, recovery actions
//! - `snapshot`: the hourly diagnostic snapshot and the agent event payloads
//! - `recommendation`: prioritized operator advice and report action items
//! - `join`: nearest-neighbour correlation by timestamp

pub mod join;
pub mod recommendation;
pub mod records;
pub mod snapshot;

pub use join::nearest_by_timestamp;
pub use recommendation::{sort_by_priority, ActionItem, ActionVerb, Category, Priority, Recommendation};
pub use records::{
    BreakoutInfo, ConfluenceInfo, HtfSignals, MarketRegime, MarketSnapshot, RecoveryAction,
    RecoveryKind, StatisticalRegime, StrategyMode, TradeRecord, VhfTrend,
};
pub use snapshot::{AgentEvent, HourlySnapshot, RecoveryActionPayload, TradeClosePayload};
