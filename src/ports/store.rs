//! Time-series store port
//!
//! Four independently retained collections. Every append enforces the
//! collection's retention window: records older than `now - window` are
//! dropped in the same write, so the next read never returns them.
//!
//! The trait is synchronous and object safe. The orchestrator calls it from
//! `spawn_blocking` where the work may touch disk.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{HourlySnapshot, MarketSnapshot, RecoveryAction, RecoveryKind, TradeRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {collection}: {source}")]
    Io {
        collection: Collection,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {collection}: {source}")]
    Serialization {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned: {0}")]
    Lock(String),
}

/// The four persisted record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    MarketSnapshots,
    Trades,
    RecoveryActions,
    HourlySnapshots,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::MarketSnapshots,
        Collection::Trades,
        Collection::RecoveryActions,
        Collection::HourlySnapshots,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::MarketSnapshots => "market_snapshots.json",
            Self::Trades => "trades.json",
            Self::RecoveryActions => "recovery_actions.json",
            Self::HourlySnapshots => "hourly_snapshots.json",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MarketSnapshots => "market_snapshots",
            Self::Trades => "trades",
            Self::RecoveryActions => "recovery_actions",
            Self::HourlySnapshots => "hourly_snapshots",
        };
        f.write_str(s)
    }
}

/// Retention window per collection, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub market_snapshot_days: u32,
    pub trade_days: u32,
    pub recovery_days: u32,
    pub hourly_snapshot_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            market_snapshot_days: 7,
            trade_days: 30,
            recovery_days: 30,
            hourly_snapshot_days: 90,
        }
    }
}

impl RetentionPolicy {
    pub fn window(&self, collection: Collection) -> Duration {
        let days = match collection {
            Collection::MarketSnapshots => self.market_snapshot_days,
            Collection::Trades => self.trade_days,
            Collection::RecoveryActions => self.recovery_days,
            Collection::HourlySnapshots => self.hourly_snapshot_days,
        };
        Duration::days(i64::from(days))
    }

    /// Oldest timestamp still retained at `now`
    pub fn cutoff(&self, collection: Collection, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window(collection)
    }
}

/// Query filter. Unset fields match everything.
///
/// Time bounds are inclusive. For trades the time axis is `close_time`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub symbol: Option<String>,
    /// Matches a trade ticket, or a recovery action's ticket or parent ticket
    pub ticket: Option<u64>,
    pub recovery_kind: Option<RecoveryKind>,
}

impl RecordFilter {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Default::default()
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_ticket(mut self, ticket: u64) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn with_kind(mut self, kind: RecoveryKind) -> Self {
        self.recovery_kind = Some(kind);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    fn in_range(&self, ts: DateTime<Utc>) -> bool {
        self.since.map_or(true, |s| ts >= s) && self.until.map_or(true, |u| ts <= u)
    }

    fn symbol_matches(&self, symbol: &str) -> bool {
        self.symbol.as_deref().map_or(true, |s| s == symbol)
    }

    pub fn matches_market(&self, s: &MarketSnapshot) -> bool {
        self.in_range(s.timestamp) && self.symbol_matches(&s.symbol)
    }

    pub fn matches_trade(&self, t: &TradeRecord) -> bool {
        self.in_range(t.close_time)
            && self.symbol_matches(&t.symbol)
            && self.ticket.map_or(true, |k| k == t.ticket)
    }

    pub fn matches_recovery(&self, a: &RecoveryAction) -> bool {
        self.in_range(a.timestamp)
            && self.symbol_matches(&a.symbol)
            && self.ticket.map_or(true, |k| a.resolves_with(k))
            && self.recovery_kind.map_or(true, |k| k == a.kind)
    }

    pub fn matches_hourly(&self, h: &HourlySnapshot) -> bool {
        self.in_range(h.timestamp)
    }
}

/// Time axis used for retention and range queries
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for MarketSnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for TradeRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.close_time
    }
}

impl Timestamped for RecoveryAction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for HourlySnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Record counts per collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub market_snapshots: usize,
    pub trades: usize,
    pub recovery_actions: usize,
    pub hourly_snapshots: usize,
    /// Recovery actions still waiting for their stack to close
    pub pending_recovery_actions: usize,
}

/// Windowed append-only persistence for diagnostic records
pub trait TimeSeriesStore: Send + Sync {
    fn append_market_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError>;
    fn append_trade(&self, trade: TradeRecord) -> Result<(), StoreError>;
    fn append_recovery_action(&self, action: RecoveryAction) -> Result<(), StoreError>;
    fn append_hourly_snapshot(&self, snapshot: HourlySnapshot) -> Result<(), StoreError>;

    fn market_snapshots(&self, filter: &RecordFilter) -> Result<Vec<MarketSnapshot>, StoreError>;
    fn trades(&self, filter: &RecordFilter) -> Result<Vec<TradeRecord>, StoreError>;
    fn recovery_actions(&self, filter: &RecordFilter) -> Result<Vec<RecoveryAction>, StoreError>;
    fn hourly_snapshots(&self, filter: &RecordFilter) -> Result<Vec<HourlySnapshot>, StoreError>;

    /// Set `recovered` on every still-pending action linked to `ticket`
    /// (by its own ticket or its parent). Returns the number updated.
    fn resolve_recovery(&self, ticket: u64, recovered: bool) -> Result<usize, StoreError>;

    fn statistics(&self) -> Result<StoreStatistics, StoreError>;
}
