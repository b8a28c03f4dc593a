//! # Exchange Rate
//!
//! Pooled value over shares. A fresh snapshot is taken every reporting
//! cycle; all conversions floor.

use std::cmp::Ordering;

use ethnum::U256;

use crate::constants::E27_PRECISION_BASE;
use crate::errors::{CoreResult, StakingCoreError};
use crate::math::{mul_div, Rounding};

/// Immutable pooled-value / shares pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    pooled_value: U256,
    shares: U256,
}

impl ExchangeRate {
    /// Build a rate; a positive pool backed by zero shares is undefined
    pub fn new(pooled_value: U256, shares: U256) -> CoreResult<Self> {
        if shares == U256::ZERO && pooled_value > U256::ZERO {
            return Err(StakingCoreError::ZeroShares {
                pooled_value: pooled_value.to_string(),
            });
        }
        Ok(Self { pooled_value, shares })
    }

    pub fn from_u128(pooled_value: u128, shares: u128) -> CoreResult<Self> {
        Self::new(U256::from(pooled_value), U256::from(shares))
    }

    pub fn pooled_value(&self) -> U256 {
        self.pooled_value
    }

    pub fn shares(&self) -> U256 {
        self.shares
    }

    /// Whether nothing is pooled yet
    pub fn is_empty(&self) -> bool {
        self.shares == U256::ZERO
    }

    /// Shares worth `value` at this rate
    pub fn shares_for_value(&self, value: U256) -> CoreResult<U256> {
        mul_div(value, self.shares, self.pooled_value, Rounding::Down)
    }

    /// Value of `shares` at this rate
    pub fn value_for_shares(&self, shares: U256) -> CoreResult<U256> {
        mul_div(shares, self.pooled_value, self.shares, Rounding::Down)
    }

    /// Integer price ratio scaled by 1e27
    pub fn price_e27(&self) -> CoreResult<U256> {
        mul_div(self.pooled_value, U256::from(E27_PRECISION_BASE), self.shares, Rounding::Down)
    }

    /// Compare two rates exactly by cross multiplication
    pub fn compare(&self, other: &ExchangeRate) -> CoreResult<Ordering> {
        let lhs = self
            .pooled_value
            .checked_mul(other.shares)
            .ok_or(StakingCoreError::MathOverflow)?;
        let rhs = other
            .pooled_value
            .checked_mul(self.shares)
            .ok_or(StakingCoreError::MathOverflow)?;
        Ok(lhs.cmp(&rhs))
    }
}
