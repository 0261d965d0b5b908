//! JSON file store
//!
//! One JSON array per collection under the data directory. Every write reads
//! the whole collection, applies the change, drops records past the retention
//! cutoff and rewrites the file through a temp file + rename, so readers only
//! ever see a complete array. Writers to the same collection serialize on a
//! per-collection mutex.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::domain::{HourlySnapshot, MarketSnapshot, RecoveryAction, TradeRecord};
use crate::ports::{
    Collection, RecordFilter, RetentionPolicy, StoreError, StoreStatistics, TimeSeriesStore,
    Timestamped,
};

pub struct JsonFileStore {
    data_dir: PathBuf,
    retention: RetentionPolicy,
    market_lock: Mutex<()>,
    trade_lock: Mutex<()>,
    recovery_lock: Mutex<()>,
    hourly_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            collection: Collection::HourlySnapshots,
            source,
        })?;
        debug!(dir = %data_dir.display(), "Opened JSON store");
        Ok(Self {
            data_dir,
            retention,
            market_lock: Mutex::new(()),
            trade_lock: Mutex::new(()),
            recovery_lock: Mutex::new(()),
            hourly_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }

    fn lock(&self, collection: Collection) -> Result<MutexGuard<'_, ()>, StoreError> {
        let lock = match collection {
            Collection::MarketSnapshots => &self.market_lock,
            Collection::Trades => &self.trade_lock,
            Collection::RecoveryActions => &self.recovery_lock,
            Collection::HourlySnapshots => &self.hourly_lock,
        };
        lock.lock()
            .map_err(|e| StoreError::Lock(format!("{collection}: {e}")))
    }

    fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>, StoreError> {
        let path = self.path(collection);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { collection, source }),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Serialization { collection, source })
    }

    fn write_atomic<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<(), StoreError> {
        let path = self.path(collection);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(records)
            .map_err(|source| StoreError::Serialization { collection, source })?;
        fs::write(&tmp, content).map_err(|source| StoreError::Io { collection, source })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { collection, source })
    }

    /// Read, mutate, enforce retention, rewrite. Holds the collection lock throughout.
    fn rewrite<T, F, R>(&self, collection: Collection, mutate: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Timestamped,
        F: FnOnce(&mut Vec<T>) -> R,
    {
        let _guard = self.lock(collection)?;
        let mut records: Vec<T> = self.load(collection)?;
        let result = mutate(&mut records);

        let cutoff = self.retention.cutoff(collection, Utc::now());
        let before = records.len();
        records.retain(|r| r.timestamp() >= cutoff);
        if records.len() < before {
            debug!(%collection, dropped = before - records.len(), "Retention pruned records");
        }

        self.write_atomic(collection, &records)?;
        Ok(result)
    }

    fn append<T>(&self, collection: Collection, record: T) -> Result<(), StoreError>
    where
        T: Serialize + DeserializeOwned + Timestamped,
    {
        self.rewrite(collection, |records: &mut Vec<T>| records.push(record))
    }

    fn query<T, F>(&self, collection: Collection, keep: F) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let records: Vec<T> = self.load(collection)?;
        Ok(records.into_iter().filter(|r| keep(r)).collect())
    }
}

impl TimeSeriesStore for JsonFileStore {
    fn append_market_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError> {
        self.append(Collection::MarketSnapshots, snapshot)
    }

    fn append_trade(&self, trade: TradeRecord) -> Result<(), StoreError> {
        self.append(Collection::Trades, trade)
    }

    fn append_recovery_action(&self, action: RecoveryAction) -> Result<(), StoreError> {
        self.append(Collection::RecoveryActions, action)
    }

    fn append_hourly_snapshot(&self, snapshot: HourlySnapshot) -> Result<(), StoreError> {
        self.append(Collection::HourlySnapshots, snapshot)
    }

    fn market_snapshots(&self, filter: &RecordFilter) -> Result<Vec<MarketSnapshot>, StoreError> {
        self.query(Collection::MarketSnapshots, |s| filter.matches_market(s))
    }

    fn trades(&self, filter: &RecordFilter) -> Result<Vec<TradeRecord>, StoreError> {
        self.query(Collection::Trades, |t| filter.matches_trade(t))
    }

    fn recovery_actions(&self, filter: &RecordFilter) -> Result<Vec<RecoveryAction>, StoreError> {
        self.query(Collection::RecoveryActions, |a| filter.matches_recovery(a))
    }

    fn hourly_snapshots(&self, filter: &RecordFilter) -> Result<Vec<HourlySnapshot>, StoreError> {
        self.query(Collection::HourlySnapshots, |h| filter.matches_hourly(h))
    }

    fn resolve_recovery(&self, ticket: u64, recovered: bool) -> Result<usize, StoreError> {
        let updated = self.rewrite(Collection::RecoveryActions, |actions: &mut Vec<RecoveryAction>| {
            let mut updated = 0;
            for a in actions.iter_mut().filter(|a| a.recovered.is_none() && a.resolves_with(ticket)) {
                a.recovered = Some(recovered);
                updated += 1;
            }
            updated
        })?;
        if updated == 0 {
            debug!(ticket, "No pending recovery actions for ticket");
        }
        Ok(updated)
    }

    fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let recovery: Vec<RecoveryAction> = self.load(Collection::RecoveryActions)?;
        let count = |c: Collection| -> Result<usize, StoreError> {
            // Counting only needs array length, not typed records
            let values: Vec<serde_json::Value> = self.load(c)?;
            Ok(values.len())
        };
        let stats = StoreStatistics {
            market_snapshots: count(Collection::MarketSnapshots)?,
            trades: count(Collection::Trades)?,
            recovery_actions: recovery.len(),
            hourly_snapshots: count(Collection::HourlySnapshots)?,
            pending_recovery_actions: recovery.iter().filter(|a| a.recovered.is_none()).count(),
        };
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketRegime, RecoveryKind, StrategyMode};
    use chrono::{DateTime, Duration};
    use tempfile::tempdir;

    fn trade_closed_at(ticket: u64, close: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            ticket,
            symbol: "EURUSD".to_string(),
            open_time: close - Duration::minutes(30),
            close_time: close,
            profit: 3.0,
            duration_minutes: 30.0,
            market_regime: MarketRegime::Ranging,
            confluence: None,
            strategy_mode: StrategyMode::Unknown,
            breakout: None,
            htf: None,
        }
    }

    fn pending_action(ticket: u64, parent: u64) -> RecoveryAction {
        RecoveryAction {
            kind: RecoveryKind::Dca,
            ticket,
            parent_ticket: parent,
            symbol: "EURUSD".to_string(),
            timestamp: Utc::now(),
            level: 1,
            cost: 1.0,
            duration_minutes: 10.0,
            drawdown: -20.0,
            total_volume: 0.1,
            recovered: None,
        }
    }

    #[test]
    fn test_append_and_query() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        store.append_trade(trade_closed_at(1, Utc::now())).unwrap();
        store.append_trade(trade_closed_at(2, Utc::now())).unwrap();

        let all = store.trades(&RecordFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        let one = store.trades(&RecordFilter::default().with_ticket(2)).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].ticket, 2);
        assert!(store.path(Collection::Trades).exists());
        assert!(!store.path(Collection::Trades).with_extension("json.tmp").exists());
    }

    #[test]
    fn test_expired_record_absent_after_write() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        store.append_trade(trade_closed_at(1, Utc::now() - Duration::days(31))).unwrap();
        store.append_trade(trade_closed_at(2, Utc::now() - Duration::days(29))).unwrap();

        let tickets: Vec<_> = store
            .trades(&RecordFilter::default())
            .unwrap()
            .iter()
            .map(|t| t.ticket)
            .collect();
        assert_eq!(tickets, vec![2]);
    }

    #[test]
    fn test_resolve_recovery_only_pending() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        store.append_recovery_action(pending_action(11, 10)).unwrap();
        store.append_recovery_action(pending_action(12, 10)).unwrap();
        store.append_recovery_action(pending_action(21, 20)).unwrap();

        assert_eq!(store.resolve_recovery(10, true).unwrap(), 2);
        // already resolved actions are not touched again
        assert_eq!(store.resolve_recovery(10, false).unwrap(), 0);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.recovery_actions, 3);
        assert_eq!(stats.pending_recovery_actions, 1);
        let resolved = store.recovery_actions(&RecordFilter::default().with_ticket(10)).unwrap();
        assert!(resolved.iter().all(|a| a.recovered == Some(true)));
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap();
        fs::write(store.path(Collection::Trades), "{ not json").unwrap();
        let err = store.trades(&RecordFilter::default()).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { collection: Collection::Trades, .. }));
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(JsonFileStore::open(dir.path(), RetentionPolicy::default()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.append_trade(trade_closed_at(i, Utc::now())).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.trades(&RecordFilter::default()).unwrap().len(), 8);
    }

    #[test]
    fn test_empty_store_statistics() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested"), RetentionPolicy::default()).unwrap();
        assert_eq!(store.statistics().unwrap(), StoreStatistics::default());
    }
}
