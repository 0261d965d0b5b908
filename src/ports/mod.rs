//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Market data feeds (historical OHLCV bars)
//! - Persistence of diagnostic records (time-series store)

pub mod market_data;
pub mod store;

// Re-export main traits and types
pub use market_data::{MarketDataError, MarketDataPort, Ohlcv};
pub use store::{
    Collection, RecordFilter, RetentionPolicy, StoreError, StoreStatistics, TimeSeriesStore,
    Timestamped,
};

#[cfg(test)]
pub use market_data::MockMarketDataPort;
