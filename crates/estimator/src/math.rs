//! 256-bit fee arithmetic helpers.
//!
//! Subtraction saturates at zero; additions and multiplications that would
//! exceed 2^256 - 1 are reported as [`EstimateError::Overflow`], never
//! truncated.

use alloy_primitives::U256;

use crate::EstimateError;

/// One gwei, in wei.
pub const GWEI: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Nearest-rank (lower) percentile over an ascending-sorted slice:
/// `values[floor((len - 1) * p)]`. Returns `None` on an empty slice.
pub fn percentile(values: &[U256], p: f64) -> Option<U256> {
    if values.is_empty() {
        return None;
    }
    let idx = ((values.len() - 1) as f64 * p) as usize;
    Some(values[idx])
}

/// Weighted average `a * w + b * (1 - w)` at integer percent precision:
/// the weight is rounded to `w * 100` and the blend computed as
/// `(a * w100 + b * (100 - w100)) / 100`.
pub fn blend(a: U256, b: U256, weight_a: f64) -> Result<U256, EstimateError> {
    let w_a = U256::from((weight_a * 100.0).round() as u64);
    let w_b = U256::from(100u64) - w_a;

    let a_weighted =
        a.checked_mul(w_a).ok_or(EstimateError::Overflow("blend"))?;
    let b_weighted =
        b.checked_mul(w_b).ok_or(EstimateError::Overflow("blend"))?;
    let sum = a_weighted.checked_add(b_weighted).ok_or(EstimateError::Overflow("blend"))?;

    Ok(sum / U256::from(100u64))
}

/// Clamps `value` into `[floor, ceiling]`.
pub fn clamp(value: U256, floor: U256, ceiling: U256) -> U256 {
    value.max(floor).min(ceiling)
}
