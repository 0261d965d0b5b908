//! Random-walk bars for paper runs and demos
//!
//! Each symbol gets its own deterministic generator (seeded from the symbol
//! name and the configured seed) so repeated cycles produce stable regimes.
//! `drift` shifts every step, which turns the walk into a trend.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{Duration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ports::{MarketDataError, MarketDataPort, Ohlcv};

#[derive(Debug, Clone)]
pub struct SyntheticMarketData {
    seed: u64,
    start_price: f64,
    /// Step size as a fraction of price
    volatility: f64,
    drift: f64,
}

impl Default for SyntheticMarketData {
    fn default() -> Self {
        Self::new(42)
    }
}

impl SyntheticMarketData {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 1.1000,
            volatility: 0.001,
            drift: 0.0,
        }
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    fn rng_for(&self, symbol: &str) -> StdRng {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        StdRng::seed_from_u64(self.seed ^ hasher.finish())
    }

    /// Generate `count` hourly bars ending at the current hour
    pub fn generate(&self, symbol: &str, count: usize) -> Vec<Ohlcv> {
        let mut rng = self.rng_for(symbol);
        let now = Utc::now();
        let end = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        let start = end - Duration::hours(count as i64);

        let mut price = self.start_price;
        (0..count)
            .map(|i| {
                let open = price;
                let step: f64 = rng.gen_range(-1.0_f64..1.0) * self.volatility + self.drift;
                let close = (open * (1.0 + step)).max(f64::EPSILON);
                let wick_up: f64 = rng.gen_range(0.0_f64..0.5) * self.volatility * open;
                let wick_down: f64 = rng.gen_range(0.0_f64..0.5) * self.volatility * open;
                price = close;
                Ohlcv {
                    timestamp: start + Duration::hours(i as i64 + 1),
                    open,
                    high: open.max(close) + wick_up,
                    low: (open.min(close) - wick_down).max(0.0),
                    close,
                    volume: rng.gen_range(100.0_f64..1000.0),
                }
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataPort for SyntheticMarketData {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        _timeframe: &str,
        count: usize,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        Ok(self.generate(symbol, count))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}
