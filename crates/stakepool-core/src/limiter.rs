//! # Positive Rebase Limiter
//!
//! Bounds how far the exchange rate may rise within one reporting cycle.
//! The budget is a fraction of the pre-report rate (base 1e9). Ether added
//! to the pool and shares removed from supply both consume it; a reported
//! consensus loss widens it, since a loss is not the inflation being bounded.
//!
//! A state lives for exactly one cycle. `used_limit` only grows, and every
//! method computes its result before touching the state, so a failed call
//! leaves the state unchanged.

use ethnum::U256;
use log::{debug, warn};

use crate::constants::LIMITER_PRECISION_BASE;
use crate::errors::{CoreResult, StakingCoreError};
use crate::math::{mul_div, safe_sub_u256, to_u64, Rounding};

/// Per-cycle limiter budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterState {
    pool_value_before: U256,
    shares_before: U256,
    /// Budget as a fraction of the pre-report rate (base 1e9)
    max_limit: u64,
    /// Portion of the budget consumed so far
    used_limit: u64,
    /// Set once the consensus delta of this cycle was applied
    consensus_applied: bool,
}

impl LimiterState {
    /// Start a cycle from the pre-report pool value and share supply
    pub fn init(
        max_limit_fraction: u64,
        pool_value_before: U256,
        shares_before: U256,
    ) -> CoreResult<Self> {
        if max_limit_fraction == 0 || max_limit_fraction > LIMITER_PRECISION_BASE {
            return Err(StakingCoreError::invalid_config(
                "max_limit_fraction",
                max_limit_fraction,
                "within (0, 1e9]",
            ));
        }

        Ok(Self {
            pool_value_before,
            shares_before,
            max_limit: max_limit_fraction,
            used_limit: 0,
            consensus_applied: false,
        })
    }

    pub fn max_limit(&self) -> u64 {
        self.max_limit
    }

    pub fn used_limit(&self) -> u64 {
        self.used_limit
    }

    pub fn pool_value_before(&self) -> U256 {
        self.pool_value_before
    }

    pub fn shares_before(&self) -> U256 {
        self.shares_before
    }

    /// True iff the whole budget is consumed
    pub fn is_limit_reached(&self) -> bool {
        self.used_limit == self.max_limit
    }

    /// Apply the cycle's consensus-layer balance change.
    ///
    /// A loss widens the budget by the lost fraction (capped at 100%) and
    /// returns zero; a gain is routed through [`Self::append_ether`]. Allowed
    /// once per cycle, before anything else consumed budget.
    pub fn apply_consensus_delta(&mut self, signed_delta: i128) -> CoreResult<U256> {
        if self.used_limit != 0 || self.consensus_applied {
            return Err(StakingCoreError::DirtyState {
                used_limit: self.used_limit,
                max_limit: self.max_limit,
            });
        }

        if signed_delta >= 0 {
            let allowed = self.append_ether(U256::from(signed_delta.unsigned_abs()))?;
            self.consensus_applied = true;
            return Ok(allowed);
        }

        let loss = U256::from(signed_delta.unsigned_abs());
        let widening = mul_div(
            loss,
            U256::from(LIMITER_PRECISION_BASE),
            self.pool_value_before,
            Rounding::Down,
        )?;
        let widened = U256::from(self.max_limit)
            .checked_add(widening)
            .ok_or(StakingCoreError::MathOverflow)?
            .min(U256::from(LIMITER_PRECISION_BASE));

        self.max_limit = to_u64(widened)?;
        self.consensus_applied = true;
        debug!("Consensus loss {} widened rebase budget to {}", loss, self.max_limit);
        Ok(U256::ZERO)
    }

    /// Remaining budget expressed in pooled value
    pub fn remaining_ether(&self) -> CoreResult<U256> {
        mul_div(
            U256::from(self.remaining()),
            self.pool_value_before,
            U256::from(LIMITER_PRECISION_BASE),
            Rounding::Down,
        )
    }

    /// Remaining budget expressed in shares that may leave the supply.
    ///
    /// Removing `d` of `S` shares raises the per-share value by `d / (S - d)`,
    /// so the cap solves `d / (S - d) = remaining`.
    pub fn remaining_shares(&self) -> CoreResult<U256> {
        let remaining = U256::from(self.remaining());
        let denominator = U256::from(LIMITER_PRECISION_BASE)
            .checked_add(remaining)
            .ok_or(StakingCoreError::MathOverflow)?;
        mul_div(self.shares_before, remaining, denominator, Rounding::Down)
    }

    /// Add pooled value, capped by the remaining budget. Returns the amount
    /// actually allowed.
    pub fn append_ether(&mut self, amount: U256) -> CoreResult<U256> {
        if self.is_limit_reached() {
            return Ok(U256::ZERO);
        }
        if self.pool_value_before == U256::ZERO {
            return Err(StakingCoreError::DivisionByZero);
        }

        let remaining_ether = self.remaining_ether()?;
        if amount >= remaining_ether {
            if amount > remaining_ether {
                warn!("Rebase limit reached: {} of {} ether allowed", remaining_ether, amount);
            }
            self.used_limit = self.max_limit;
            return Ok(remaining_ether);
        }

        let consumed = mul_div(
            amount,
            U256::from(LIMITER_PRECISION_BASE),
            self.pool_value_before,
            Rounding::Down,
        )?;
        self.used_limit = self.advance(consumed)?;
        Ok(amount)
    }

    /// Remove shares from supply, capped by the remaining budget. Returns the
    /// number of shares actually allowed.
    pub fn deduct_shares(&mut self, shares_amount: U256) -> CoreResult<U256> {
        if self.is_limit_reached() {
            return Ok(U256::ZERO);
        }
        if self.shares_before == U256::ZERO {
            return Err(StakingCoreError::DivisionByZero);
        }

        let remaining_shares = self.remaining_shares()?;
        if shares_amount >= remaining_shares {
            if shares_amount > remaining_shares {
                warn!(
                    "Rebase limit reached: {} of {} shares allowed",
                    remaining_shares, shares_amount
                );
            }
            self.used_limit = self.max_limit;
            return Ok(remaining_shares);
        }

        let shares_left = safe_sub_u256(self.shares_before, shares_amount)?;
        let consumed = mul_div(
            shares_amount,
            U256::from(LIMITER_PRECISION_BASE),
            shares_left,
            Rounding::Down,
        )?;
        self.used_limit = self.advance(consumed)?;
        Ok(shares_amount)
    }

    fn remaining(&self) -> u64 {
        self.max_limit - self.used_limit
    }

    fn advance(&self, consumed: U256) -> CoreResult<u64> {
        let used = U256::from(self.used_limit)
            .checked_add(consumed)
            .ok_or(StakingCoreError::MathOverflow)?;
        to_u64(used.min(U256::from(self.max_limit)))
    }
}
