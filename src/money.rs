//! Decimal Arithmetic Layer
//!
//! Every monetary amount, pool volume, probability and odds value in the
//! engine is a [`Decimal`]. Derived quantities (odds, payouts, refunds) are
//! truncated toward zero at [`SCALE`] fractional digits so that rounding never
//! hands out value the pools do not hold.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept on every derived quantity
pub const SCALE: u32 = 18;

/// Truncate (round toward zero) to [`SCALE`] fractional digits
pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
}

/// Multiply and truncate
pub fn mul(a: Decimal, b: Decimal) -> Decimal {
    truncate(a * b)
}

/// Divide and truncate. Returns `None` on a zero divisor.
pub fn div(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    numerator.checked_div(denominator).map(truncate)
}

/// `amount * numerator / denominator`, multiplying first to keep precision.
/// Used for pro-rata shares.
///
/// When the product does not fit in a [`Decimal`] the division is done first
/// instead. Returns `None` on a zero denominator or if neither order fits.
pub fn pro_rata(amount: Decimal, numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    match amount.checked_mul(numerator) {
        Some(scaled) => scaled.checked_div(denominator).map(truncate),
        None => amount
            .checked_div(denominator)?
            .checked_mul(numerator)
            .map(truncate),
    }
}

/// Clamp into `[lo, hi]`
pub fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

/// Amount remaining after a fee rate is taken off, i.e. `amount * (1 - rate)`
pub fn net_of_fee(amount: Decimal, rate: Decimal) -> Decimal {
    mul(amount, Decimal::ONE - rate)
}
