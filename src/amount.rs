//! Decimal-to-integer-cents normalization (C1).
//!
//! All monetary values are normalized to integer cents by rounding
//! half-up to 2 decimal places before multiplying by 100. This is the
//! only place decimal rounding happens outside the VAT consistency check.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a decimal to 2 places, half-up (ties away from zero on the
/// positive side, matching Python's `ROUND_HALF_UP`).
pub fn q2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to 2dp and convert to integer cents. Negative inputs are not
/// rejected here — the validator is responsible for surfacing
/// `NEGATIVE_AMOUNT`; this function is pure normalization.
pub fn cents(value: Decimal) -> i64 {
    let scaled = q2(value) * Decimal::from(100);
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_string()
        .parse::<i64>()
        .expect("q2-rounded amount scaled by 100 always fits an i64 and parses")
}

/// Restore a decimal amount from integer cents.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::from(cents) / Decimal::from(100)
}
