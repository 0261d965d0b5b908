//! Bars exported by the trading terminal as JSON files
//!
//! Layout: `<bars_dir>/<SYMBOL>_<TIMEFRAME>.json`, each an array of OHLCV
//! objects. Files are re-read on every request so a terminal-side exporter
//! can overwrite them between cycles.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::ports::{MarketDataError, MarketDataPort, Ohlcv};

#[derive(Debug, Clone)]
pub struct JsonBarsProvider {
    bars_dir: PathBuf,
}

impl JsonBarsProvider {
    pub fn new(bars_dir: impl Into<PathBuf>) -> Self {
        Self {
            bars_dir: bars_dir.into(),
        }
    }

    pub fn file_for(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.bars_dir.join(format!("{symbol}_{timeframe}.json"))
    }
}

#[async_trait]
impl MarketDataPort for JsonBarsProvider {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        let path = self.file_for(symbol, timeframe);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MarketDataError::NotFound {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut bars: Vec<Ohlcv> = serde_json::from_str(&content)
            .map_err(|e| MarketDataError::ParseError(format!("{}: {e}", path.display())))?;
        bars.sort_by_key(|b| b.timestamp);
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        debug!(symbol, timeframe, bars = bars.len(), "Loaded bars from file");
        Ok(bars)
    }

    fn name(&self) -> &'static str {
        "json-bars"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn write_bars(dir: &std::path::Path, n: usize) {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        // written newest first to check sorting
        let bars: Vec<Ohlcv> = (0..n)
            .rev()
            .map(|i| Ohlcv {
                timestamp: start + Duration::hours(i as i64),
                open: 1.1,
                high: 1.2,
                low: 1.0,
                close: 1.1 + i as f64 * 1e-4,
                volume: 10.0,
            })
            .collect();
        std::fs::write(dir.join("EURUSD_H1.json"), serde_json::to_string(&bars).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_returns_latest_sorted() {
        let dir = tempdir().unwrap();
        write_bars(dir.path(), 10);
        let provider = JsonBarsProvider::new(dir.path());
        let bars = provider.get_historical_bars("EURUSD", "H1", 4).await.unwrap();
        assert_eq!(bars.len(), 4);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(bars[3].timestamp, Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_missing_symbol_is_not_found() {
        let dir = tempdir().unwrap();
        let provider = JsonBarsProvider::new(dir.path());
        let err = provider.get_historical_bars("USDJPY", "H1", 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_garbage_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("EURUSD_H1.json"), "[{]").unwrap();
        let provider = JsonBarsProvider::new(dir.path());
        let err = provider.get_historical_bars("EURUSD", "H1", 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::ParseError(_)));
    }
}
