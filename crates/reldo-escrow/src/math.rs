//! Overflow-free integer helpers for settlement arithmetic.

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128` values as `(high, low)` halves.
pub fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Each term is below 2^64, so the sum stays below 3 * 2^64
    let mid = (ll >> 64) + (lh & LOW_MASK) + (hl & LOW_MASK);
    let low = (ll & LOW_MASK) | (mid << 64);
    let high = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (high, low)
}

/// `floor(a * b / divisor)` computed without an intermediate overflow.
///
/// Returns `None` when `divisor` is zero or the quotient does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, divisor: u128) -> Option<u128> {
    if divisor == 0 {
        return None;
    }
    let (high, low) = widening_mul(a, b);
    if high == 0 {
        return Some(low / divisor);
    }
    if high >= divisor {
        return None;
    }

    // Restoring long division of high:low, one bit at a time.
    // rem < divisor holds at the top of every iteration.
    let mut rem = high;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= divisor {
            rem = rem.wrapping_sub(divisor);
            quotient |= 1;
        }
    }
    Some(quotient)
}
