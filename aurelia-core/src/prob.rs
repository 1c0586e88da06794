//! Log-space probability arithmetic.
//!
//! The dynamic-programming matrices store natural-log probabilities, so
//! sums of probabilities become [`log_sum_exp`] reductions. All helpers
//! treat negative infinity as an exact zero probability.

/// Sentinel for a catastrophically small matrix likelihood.
///
/// A banded sweep whose total falls at or below half this value means the
/// band missed every plausible alignment or the probabilities underflowed;
/// callers report the pair rather than aborting the batch.
pub const MIN_MATRIX_LIKELIHOOD: f64 = -1e8;

/// Numerically stable `ln(exp(a) + exp(b))`.
///
/// When either operand is `-inf` the other is returned exactly; otherwise
/// the result is `max + ln_1p(exp(-|a - b|))`.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// Three-way log-sum-exp.
pub fn log_sum_exp3(a: f64, b: f64, c: f64) -> f64 {
    log_sum_exp(log_sum_exp(a, b), c)
}
