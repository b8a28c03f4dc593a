//! # Safe Math Operations
//!
//! Overflow-checked arithmetic. Nothing here wraps or saturates silently.

use ethnum::U256;

use crate::errors::{CoreResult, StakingCoreError};

/// Macro to generate safe arithmetic functions
macro_rules! safe_arith {
    // Binary operations with checked methods
    ($fn_name:ident, $type:ty, $checked_method:ident, $error:expr) => {
        /// Checked binary operation
        pub fn $fn_name(a: $type, b: $type) -> CoreResult<$type> {
            a.$checked_method(b).ok_or($error)
        }
    };

    // Division operations with zero check (always floors)
    (div, $fn_name:ident, $type:ty) => {
        /// Floor division with zero check
        pub fn $fn_name(a: $type, b: $type) -> CoreResult<$type> {
            if b == 0 {
                return Err(StakingCoreError::DivisionByZero);
            }
            Ok(a / b)
        }
    };
}

safe_arith!(safe_add_u64, u64, checked_add, StakingCoreError::MathOverflow);
safe_arith!(safe_sub_u64, u64, checked_sub, StakingCoreError::MathUnderflow);

safe_arith!(safe_add_u128, u128, checked_add, StakingCoreError::MathOverflow);
safe_arith!(safe_sub_u128, u128, checked_sub, StakingCoreError::MathUnderflow);
safe_arith!(safe_mul_u128, u128, checked_mul, StakingCoreError::MathOverflow);
safe_arith!(div, safe_div_u128, u128);

safe_arith!(safe_sub_u256, U256, checked_sub, StakingCoreError::MathUnderflow);

/// Signed delta applied to an unsigned balance
pub fn safe_apply_delta_u128(value: u128, delta: i128) -> CoreResult<u128> {
    if delta >= 0 {
        safe_add_u128(value, delta.unsigned_abs())
    } else {
        safe_sub_u128(value, delta.unsigned_abs())
    }
}

/// Sum a slice without wrapping
pub fn safe_sum_u64(values: &[u64]) -> CoreResult<u64> {
    values.iter().try_fold(0u64, |acc, v| safe_add_u64(acc, *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_ops() {
        assert_eq!(safe_add_u128(1, 2).unwrap(), 3);
        assert_eq!(safe_sub_u128(1, 2), Err(StakingCoreError::MathUnderflow));
        assert_eq!(safe_add_u64(u64::MAX, 1), Err(StakingCoreError::MathOverflow));
        assert_eq!(safe_div_u128(7, 2).unwrap(), 3);
        assert_eq!(safe_div_u128(7, 0), Err(StakingCoreError::DivisionByZero));
        assert_eq!(safe_mul_u128(u128::MAX, 2), Err(StakingCoreError::MathOverflow));
        assert_eq!(safe_sub_u256(U256::ONE, U256::from(2u8)), Err(StakingCoreError::MathUnderflow));
    }

    #[test]
    fn test_signed_delta() {
        assert_eq!(safe_apply_delta_u128(10, -4).unwrap(), 6);
        assert_eq!(safe_apply_delta_u128(10, 5).unwrap(), 15);
        assert_eq!(safe_apply_delta_u128(3, -4), Err(StakingCoreError::MathUnderflow));
        assert_eq!(safe_apply_delta_u128(0, i128::MIN), Err(StakingCoreError::MathUnderflow));
    }

    #[test]
    fn test_sum() {
        assert_eq!(safe_sum_u64(&[1, 2, 3]).unwrap(), 6);
        assert_eq!(safe_sum_u64(&[u64::MAX, 1]), Err(StakingCoreError::MathOverflow));
    }
}
