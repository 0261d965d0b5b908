//! In-memory store with the same retention semantics as the file store

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::domain::{HourlySnapshot, MarketSnapshot, RecoveryAction, TradeRecord};
use crate::ports::{
    Collection, RecordFilter, RetentionPolicy, StoreError, StoreStatistics, TimeSeriesStore,
    Timestamped,
};

#[derive(Default)]
struct Collections {
    market: Vec<MarketSnapshot>,
    trades: Vec<TradeRecord>,
    recovery: Vec<RecoveryAction>,
    hourly: Vec<HourlySnapshot>,
}

#[derive(Default)]
pub struct InMemoryStore {
    retention: RetentionPolicy,
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            inner: RwLock::new(Collections::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.inner.read().map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        self.inner.write().map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn prune<T: Timestamped>(&self, collection: Collection, records: &mut Vec<T>) {
        let cutoff = self.retention.cutoff(collection, Utc::now());
        records.retain(|r| r.timestamp() >= cutoff);
    }
}

impl TimeSeriesStore for InMemoryStore {
    fn append_market_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.market.push(snapshot);
        self.prune(Collection::MarketSnapshots, &mut inner.market);
        Ok(())
    }

    fn append_trade(&self, trade: TradeRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.trades.push(trade);
        self.prune(Collection::Trades, &mut inner.trades);
        Ok(())
    }

    fn append_recovery_action(&self, action: RecoveryAction) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.recovery.push(action);
        self.prune(Collection::RecoveryActions, &mut inner.recovery);
        Ok(())
    }

    fn append_hourly_snapshot(&self, snapshot: HourlySnapshot) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.hourly.push(snapshot);
        self.prune(Collection::HourlySnapshots, &mut inner.hourly);
        Ok(())
    }

    fn market_snapshots(&self, filter: &RecordFilter) -> Result<Vec<MarketSnapshot>, StoreError> {
        let inner = self.read()?;
        Ok(inner.market.iter().filter(|s| filter.matches_market(s)).cloned().collect())
    }

    fn trades(&self, filter: &RecordFilter) -> Result<Vec<TradeRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner.trades.iter().filter(|t| filter.matches_trade(t)).cloned().collect())
    }

    fn recovery_actions(&self, filter: &RecordFilter) -> Result<Vec<RecoveryAction>, StoreError> {
        let inner = self.read()?;
        Ok(inner.recovery.iter().filter(|a| filter.matches_recovery(a)).cloned().collect())
    }

    fn hourly_snapshots(&self, filter: &RecordFilter) -> Result<Vec<HourlySnapshot>, StoreError> {
        let inner = self.read()?;
        Ok(inner.hourly.iter().filter(|h| filter.matches_hourly(h)).cloned().collect())
    }

    fn resolve_recovery(&self, ticket: u64, recovered: bool) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let mut updated = 0;
        for a in inner
            .recovery
            .iter_mut()
            .filter(|a| a.recovered.is_none() && a.resolves_with(ticket))
        {
            a.recovered = Some(recovered);
            updated += 1;
        }
        Ok(updated)
    }

    fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let inner = self.read()?;
        Ok(StoreStatistics {
            market_snapshots: inner.market.len(),
            trades: inner.trades.len(),
            recovery_actions: inner.recovery.len(),
            hourly_snapshots: inner.hourly.len(),
            pending_recovery_actions: inner.recovery.iter().filter(|a| a.recovered.is_none()).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_market_snapshot_retention_is_seven_days() {
        let store = InMemoryStore::default();
        let old = MarketSnapshot::unknown("EURUSD", Utc::now() - Duration::days(8), "old");
        let fresh = MarketSnapshot::unknown("EURUSD", Utc::now() - Duration::days(6), "fresh");
        store.append_market_snapshot(old).unwrap();
        store.append_market_snapshot(fresh).unwrap();

        let snaps = store.market_snapshots(&RecordFilter::default()).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].recovery_reason, "fresh");
    }

    #[test]
    fn test_symbol_filter() {
        let store = InMemoryStore::default();
        store.append_market_snapshot(MarketSnapshot::unknown("EURUSD", Utc::now(), "")).unwrap();
        store.append_market_snapshot(MarketSnapshot::unknown("GBPUSD", Utc::now(), "")).unwrap();
        let only = store
            .market_snapshots(&RecordFilter::default().with_symbol("GBPUSD"))
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(store.statistics().unwrap().market_snapshots, 2);
    }
}
