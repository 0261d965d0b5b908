//! Vertical Horizontal Filter
//!
//! VHF = (max(close) - min(close)) / sum(|close[i] - close[i-1]|)
//!
//! High VHF means price travelled mostly in one direction (trend), low VHF
//! means it churned back and forth (range or chop). A flat window has a zero
//! denominator and reads as 0.0.

use crate::domain::VhfTrend;

/// VHF over the last `period` closes, `None` if fewer are available
pub fn vhf(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let (lo, hi) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &c| (lo.min(c), hi.max(c)));
    let travel: f64 = window.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    if travel == 0.0 {
        return Some(0.0);
    }
    Some((hi - lo).abs() / travel)
}

/// Direction of VHF across the last three non-overlapping `period` windows.
///
/// Rising only when strictly increasing oldest to newest, falling only when
/// strictly decreasing; anything else is stable.
pub fn vhf_trend(closes: &[f64], period: usize) -> Option<VhfTrend> {
    if period < 2 || closes.len() < period * 3 {
        return None;
    }
    let end = closes.len();
    let oldest = vhf(&closes[..end - 2 * period], period)?;
    let middle = vhf(&closes[..end - period], period)?;
    let newest = vhf(closes, period)?;

    let trend = if newest > middle && middle > oldest {
        VhfTrend::Rising
    } else if newest < middle && middle < oldest {
        VhfTrend::Falling
    } else {
        VhfTrend::Stable
    };
    Some(trend)
}
