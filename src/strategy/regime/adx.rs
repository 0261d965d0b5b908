//! ADX (Average Directional Index)
//!
//! Implements Wilder's ADX indicator for trend strength measurement.
//! ADX measures trend strength without indicating direction (0-100 scale).
//!
//! Components:
//! - +DI (Plus Directional Indicator): Upward price movement strength
//! - -DI (Minus Directional Indicator): Downward price movement strength
//! - ADX: Smoothed average of DX, measuring overall trend strength
//!
//! Bucket boundaries used by the classifier:
//! - ADX < 20: Ranging market (recovery mechanisms are safe)
//! - ADX 20-25: Transition zone
//! - ADX >= 25: Trending market (direction taken from the EMA slope)

use crate::ports::Ohlcv;

/// ADX calculation result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxResult {
    /// Plus Directional Indicator (0-100)
    pub plus_di: f64,
    /// Minus Directional Indicator (0-100)
    pub minus_di: f64,
    /// Average Directional Index (0-100)
    pub adx: f64,
    /// Directional Index (0-100)
    pub dx: f64,
    /// True once warmup complete
    pub is_valid: bool,
}

/// Streaming Wilder ADX
#[derive(Debug)]
pub struct WilderAdx {
    period: usize,

    // Previous bar data
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,

    // Wilder's smoothed values
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,

    adx: f64,
    bars_processed: usize,

    // Initialization accumulators
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    dx_values: Vec<f64>,

    plus_di: f64,
    minus_di: f64,
}

impl WilderAdx {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            adx: 0.0,
            bars_processed: 0,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            dx_values: Vec::with_capacity(period),
            plus_di: 0.0,
            minus_di: 0.0,
        }
    }

    /// Minimum bars needed before ADX is valid
    pub fn warmup_periods(&self) -> usize {
        2 * self.period - 1
    }

    /// Run over a whole window and return the final reading
    pub fn compute(period: usize, bars: &[Ohlcv]) -> AdxResult {
        let mut adx = Self::new(period);
        let mut last = AdxResult {
            plus_di: 0.0,
            minus_di: 0.0,
            adx: 0.0,
            dx: 0.0,
            is_valid: false,
        };
        for bar in bars {
            last = adx.update(bar.high, bar.low, bar.close);
        }
        last
    }

    /// Update with new bar data, returns ADX result
    pub fn update(&mut self, high: f64, low: f64, close: f64) -> AdxResult {
        let n = self.period as f64;

        let tr = self.true_range(high, low);
        let (plus_dm, minus_dm) = self.directional_movement(high, low);

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);

        self.bars_processed += 1;

        // Phase 1: Accumulate for first smoothed values (bars 1 to n)
        if self.bars_processed <= self.period {
            self.tr_sum += tr;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;

            if self.bars_processed == self.period {
                self.smoothed_tr = self.tr_sum;
                self.smoothed_plus_dm = self.plus_dm_sum;
                self.smoothed_minus_dm = self.minus_dm_sum;
                self.update_di();
                let dx = self.dx();
                self.dx_values.push(dx);
            }

            return AdxResult {
                plus_di: self.plus_di,
                minus_di: self.minus_di,
                adx: 0.0,
                dx: 0.0,
                is_valid: false,
            };
        }

        // Phase 2: Wilder's smoothing
        // Smoothed = Previous - (Previous / n) + Current
        self.smoothed_tr = self.smoothed_tr - (self.smoothed_tr / n) + tr;
        self.smoothed_plus_dm = self.smoothed_plus_dm - (self.smoothed_plus_dm / n) + plus_dm;
        self.smoothed_minus_dm = self.smoothed_minus_dm - (self.smoothed_minus_dm / n) + minus_dm;

        self.update_di();
        let dx = self.dx();

        // Phase 2a: Accumulate DX for first ADX (bars n+1 to 2n-1)
        if self.bars_processed < 2 * self.period {
            self.dx_values.push(dx);

            if self.bars_processed == 2 * self.period - 1 {
                self.adx = self.dx_values.iter().sum::<f64>() / n;
            }

            return AdxResult {
                plus_di: self.plus_di,
                minus_di: self.minus_di,
                adx: self.adx,
                dx,
                is_valid: self.is_valid(),
            };
        }

        // Phase 3: ADX = (Previous_ADX * (n-1) + Current_DX) / n
        self.adx = (self.adx * (n - 1.0) + dx) / n;

        AdxResult {
            plus_di: self.plus_di,
            minus_di: self.minus_di,
            adx: self.adx,
            dx,
            is_valid: true,
        }
    }

    /// True Range (accounts for gaps)
    #[inline]
    fn true_range(&self, high: f64, low: f64) -> f64 {
        match self.prev_close {
            Some(prev_close) => {
                let hl = high - low;
                let hc = (high - prev_close).abs();
                let lc = (low - prev_close).abs();
                hl.max(hc).max(lc)
            }
            None => high - low,
        }
    }

    /// Directional Movement (+DM and -DM)
    #[inline]
    fn directional_movement(&self, high: f64, low: f64) -> (f64, f64) {
        match (self.prev_high, self.prev_low) {
            (Some(prev_high), Some(prev_low)) => {
                let up_move = high - prev_high;
                let down_move = prev_low - low;

                if up_move > down_move && up_move > 0.0 {
                    (up_move, 0.0)
                } else if down_move > up_move && down_move > 0.0 {
                    (0.0, down_move)
                } else {
                    (0.0, 0.0)
                }
            }
            _ => (0.0, 0.0),
        }
    }

    #[inline]
    fn update_di(&mut self) {
        if self.smoothed_tr > 0.0 {
            self.plus_di = (self.smoothed_plus_dm / self.smoothed_tr) * 100.0;
            self.minus_di = (self.smoothed_minus_dm / self.smoothed_tr) * 100.0;
        } else {
            self.plus_di = 0.0;
            self.minus_di = 0.0;
        }
    }

    #[inline]
    fn dx(&self) -> f64 {
        let di_sum = self.plus_di + self.minus_di;
        if di_sum > 0.0 {
            ((self.plus_di - self.minus_di).abs() / di_sum) * 100.0
        } else {
            0.0
        }
    }

    /// Check if ADX is valid (warmup complete)
    pub fn is_valid(&self) -> bool {
        self.bars_processed >= self.warmup_periods()
    }

    pub fn adx(&self) -> f64 {
        self.adx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::regime::test_bars::{bars_from_closes, linear, zigzag};

    #[test]
    fn test_warmup_periods() {
        assert_eq!(WilderAdx::new(14).warmup_periods(), 27);
        assert_eq!(WilderAdx::new(5).warmup_periods(), 9);
    }

    #[test]
    fn test_invalid_until_warmup() {
        let mut adx = WilderAdx::new(5);
        for i in 0..8 {
            let p = 100.0 + i as f64;
            let result = adx.update(p + 0.5, p - 0.5, p);
            assert!(!result.is_valid);
        }
        let result = adx.update(109.5, 108.5, 109.0);
        assert!(result.is_valid);
    }

    #[test]
    fn test_strong_uptrend_high_adx() {
        let bars = bars_from_closes(&linear(100.0, 0.5, 80));
        let result = WilderAdx::compute(14, &bars);
        assert!(result.is_valid);
        assert!(result.adx > 25.0, "ADX = {}", result.adx);
        assert!(result.plus_di > result.minus_di);
    }

    #[test]
    fn test_zigzag_low_adx() {
        let bars = bars_from_closes(&zigzag(100.0, 1.0, 80));
        let result = WilderAdx::compute(14, &bars);
        assert!(result.is_valid);
        assert!(result.adx < 20.0, "ADX = {}", result.adx);
    }

    #[test]
    fn test_flat_market_is_zero() {
        let bars = bars_from_closes(&vec![100.0; 40]);
        let result = WilderAdx::compute(14, &bars);
        assert!(result.is_valid);
        assert_eq!(result.adx, 0.0);
    }
}
