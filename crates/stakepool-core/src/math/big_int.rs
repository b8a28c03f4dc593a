//! Big integer operations for high-precision math
//!
//! Mul-div helpers over `ethnum::U256` so that `a * b / c` on 128-bit
//! operands never loses the intermediate product.

use ethnum::U256;

use crate::errors::{CoreResult, StakingCoreError};

/// Rounding mode for division operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round down (towards zero)
    Down,
    /// Round up (away from zero)
    Up,
}

/// Multiply two values and divide by a third with specified rounding
/// result = (a * b) / denominator
pub fn mul_div(a: U256, b: U256, denominator: U256, rounding: Rounding) -> CoreResult<U256> {
    if denominator == U256::ZERO {
        return Err(StakingCoreError::DivisionByZero);
    }

    let product = a.checked_mul(b).ok_or(StakingCoreError::MulDivOverflow)?;
    let quotient = product / denominator;

    if rounding == Rounding::Up && product % denominator != U256::ZERO {
        return quotient
            .checked_add(U256::ONE)
            .ok_or(StakingCoreError::MulDivOverflow);
    }

    Ok(quotient)
}

/// Multiply two u128 values and divide by a third with specified rounding
pub fn mul_div_u128(a: u128, b: u128, denominator: u128, rounding: Rounding) -> CoreResult<u128> {
    let result = mul_div(U256::from(a), U256::from(b), U256::from(denominator), rounding)?;
    to_u128(result)
}

/// Narrow a U256 into u128, failing if the high word is set
pub fn to_u128(value: U256) -> CoreResult<u128> {
    if *value.high() != 0 {
        return Err(StakingCoreError::ConversionError);
    }
    Ok(*value.low())
}

/// Narrow a U256 into u64
pub fn to_u64(value: U256) -> CoreResult<u64> {
    let narrow = to_u128(value)?;
    u64::try_from(narrow).map_err(|_| StakingCoreError::ConversionError)
}
