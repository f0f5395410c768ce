//! Fractional sibling keys.
//!
//! Siblings are ordered by a positive `f64`. Appending takes the next integer
//! above the current maximum; inserting between two keys takes their midpoint.
//! Repeated midpoint inserts shrink the gap until it drops below the configured
//! precision, at which point callers rebalance the sibling list to
//! [`rebalanced`] keys and retry the placement.

/// Key given to the first child of a parent.
pub const FIRST_KEY: f64 = 1.0;

/// Key for a new last sibling. `None` when `last + 1` is not representable.
pub fn key_after(last: Option<f64>) -> Option<f64> {
    match last {
        None => Some(FIRST_KEY),
        Some(last) => {
            let next = last.floor() + 1.0;
            (next.is_finite() && next > last).then_some(next)
        }
    }
}

/// Midpoint strictly between `lower` and `upper`.
///
/// Returns `None` when the relative gap is smaller than `10^-precision_digits`
/// or the midpoint collapses onto a bound.
pub fn key_between(lower: f64, upper: f64, precision_digits: u32) -> Option<f64> {
    if !(lower < upper) {
        return None;
    }
    let scale = upper.abs().max(1.0);
    let min_gap = 10f64.powi(-(precision_digits as i32));
    if (upper - lower) / scale < min_gap {
        return None;
    }
    let mid = lower + (upper - lower) / 2.0;
    (mid > lower && mid < upper).then_some(mid)
}

/// Key that places an entry at `index` within `siblings` (ascending keys,
/// entry itself excluded). `index == siblings.len()` appends.
pub fn key_for_index(siblings: &[f64], index: usize, precision_digits: u32) -> Option<f64> {
    let lower = index.checked_sub(1).and_then(|prev| siblings.get(prev)).copied();
    match siblings.get(index) {
        None => key_after(lower),
        Some(&upper) => key_between(lower.unwrap_or(0.0), upper, precision_digits),
    }
}

/// Evenly spaced keys `1.0, 2.0, …` for `count` siblings.
pub fn rebalanced(count: usize) -> Vec<f64> {
    (1..=count).map(|position| position as f64).collect()
}

/// Checks a caller-supplied key.
pub fn validate_override(value: f64) -> Result<f64, String> {
    if !value.is_finite() {
        return Err(format!("sort order must be finite, got {value}"));
    }
    if value <= 0.0 {
        return Err(format!("sort order must be positive, got {value}"));
    }
    Ok(value)
}
