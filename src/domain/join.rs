//! Nearest-neighbour join by timestamp
//!
//! Correlates a record with whichever candidate lies closest in time, bounded
//! by a maximum tolerance. Candidates outside the tolerance never match, so a
//! trade opened while the monitor was down is left untagged rather than
//! borrowing a stale classification.

use chrono::{DateTime, Duration, Utc};

/// Return the candidate whose timestamp is closest to `target`.
///
/// Ties resolve to the earlier candidate in slice order. Returns `None` when
/// `items` is empty or the closest candidate is further than `tolerance`.
pub fn nearest_by_timestamp<'a, T, F>(
    target: DateTime<Utc>,
    items: &'a [T],
    key: F,
    tolerance: Duration,
) -> Option<&'a T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut best: Option<(&T, Duration)> = None;
    for item in items {
        let delta = key(item) - target;
        let distance = if delta < Duration::zero() { -delta } else { delta };
        if distance > tolerance {
            continue;
        }
        match best {
            Some((_, d)) if d <= distance => {}
            _ => best = Some((item, distance)),
        }
    }
    best.map(|(item, _)| item)
}
