use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market data error type
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("No data for {symbol} on {timeframe}")]
    NotFound { symbol: String, timeframe: String },

    #[error("I/O error reading bars: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// OHLCV data structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Ohlcv {
    /// Validate OHLC data integrity
    pub fn is_valid(&self) -> bool {
        self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.open.is_finite()
            && self.high >= self.low
            && self.close >= self.low
            && self.close <= self.high
    }
}

/// Market data port trait
///
/// Implementations return bars sorted ascending by time, most recent last.
/// Returning fewer than `count` rows is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch the most recent `count` bars for `symbol` at `timeframe`
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Ohlcv>, MarketDataError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}
