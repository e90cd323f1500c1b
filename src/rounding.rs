//! Lot rounding and per-instrument order value caps.

/// Truncate a fractional quantity to a whole tradable lot.
///
/// Negative, zero and NaN inputs yield 0; quantities never go negative.
///
/// ```
/// use lotplan::round_lot;
///
/// assert_eq!(round_lot(9.99), 9);
/// assert_eq!(round_lot(-3.0), 0);
/// ```
#[inline]
pub fn round_lot(qty: f64) -> i64 {
    if qty > 0.0 {
        // `as` saturates at i64::MAX
        qty.trunc() as i64
    } else {
        0
    }
}

/// Cap an order so that `qty * price` does not exceed `max_notional`.
///
/// A cap of zero (or less) means unlimited. If even one unit exceeds the cap
/// the result is 0, which removes the order.
pub fn clamp_order_value(qty: i64, price: f64, max_notional: f64) -> i64 {
    if max_notional <= 0.0 || price <= 0.0 {
        return qty;
    }
    if qty as f64 * price <= max_notional {
        return qty;
    }
    round_lot(max_notional / price).min(qty).max(0)
}
