//! # Reward Distribution
//!
//! Splits protocol rewards into operator and treasury fees in proportion to
//! each module's share of active keys. Fee shares are expressed against
//! [`FEE_PRECISION_POINTS`] (1e20 = 100% of rewards).
//!
//! A stopped module keeps its key weight: its treasury component and its
//! operator fee still count toward `total_fee`, but the operator fee is not
//! paid to it, so the treasury absorbs it.

use ethnum::U256;
use log::debug;

use crate::constants::{FEE_PRECISION_POINTS, TOTAL_BASIS_POINTS};
use crate::errors::{CoreResult, StakingCoreError};
use crate::math::{mul_div, mul_div_u128, safe_add_u128, safe_sub_u128, to_u128, Rounding};
use crate::types::{Address, ModuleId, ModuleRecord, ModuleStatus};

/// Per-module fee shares for one distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardDistribution {
    /// Modules with nonzero key weight, in input order
    pub module_ids: Vec<ModuleId>,
    pub recipients: Vec<Address>,
    /// Operator fee share per module (zero for stopped modules)
    pub module_fees: Vec<u128>,
    /// Operator plus treasury fee over all modules
    pub total_fee: u128,
    pub precision_points: u128,
}

impl RewardDistribution {
    /// Nothing to distribute: no modules or no active keys
    pub fn empty() -> Self {
        Self {
            module_ids: Vec::new(),
            recipients: Vec::new(),
            module_fees: Vec::new(),
            total_fee: 0,
            precision_points: FEE_PRECISION_POINTS,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Part of `total_fee` kept by the treasury
    pub fn treasury_fee(&self) -> CoreResult<u128> {
        let module_total = self
            .module_fees
            .iter()
            .try_fold(0u128, |acc, fee| safe_add_u128(acc, *fee))?;
        safe_sub_u128(self.total_fee, module_total)
    }
}

/// Compute fee shares from a module snapshot
pub fn distribute(modules: &[ModuleRecord]) -> CoreResult<RewardDistribution> {
    let total_active_keys: u128 = modules.iter().map(|m| u128::from(m.active_keys)).sum();
    if modules.is_empty() || total_active_keys == 0 {
        return Ok(RewardDistribution::empty());
    }

    let mut distribution = RewardDistribution::empty();
    for module in modules.iter().filter(|m| m.active_keys > 0) {
        let key_share = mul_div_u128(
            u128::from(module.active_keys),
            FEE_PRECISION_POINTS,
            total_active_keys,
            Rounding::Down,
        )?;
        let module_fee = mul_div_u128(
            key_share,
            u128::from(module.fee_bps),
            TOTAL_BASIS_POINTS,
            Rounding::Down,
        )?;
        let treasury_fee = mul_div_u128(
            key_share,
            u128::from(module.treasury_fee_bps),
            TOTAL_BASIS_POINTS,
            Rounding::Down,
        )?;

        distribution.module_ids.push(module.id);
        distribution.recipients.push(module.address);
        distribution.module_fees.push(if module.status == ModuleStatus::Stopped {
            0
        } else {
            module_fee
        });
        distribution.total_fee = safe_add_u128(
            distribution.total_fee,
            safe_add_u128(module_fee, treasury_fee)?,
        )?;
    }

    if distribution.total_fee >= distribution.precision_points {
        return Err(StakingCoreError::FeeExceedsTotal {
            total_fee: distribution.total_fee,
            precision: distribution.precision_points,
        });
    }

    debug!(
        "Distributed fees over {} modules, total fee {}",
        distribution.recipients.len(),
        distribution.total_fee
    );
    Ok(distribution)
}

/// Shares minted to fee recipients for one report's rewards
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct FeeMint {
    pub total_shares: u128,
    /// `(module, recipient, shares)` in distribution order
    pub module_shares: Vec<(ModuleId, Address, u128)>,
    pub treasury_shares: u128,
}

impl FeeMint {
    /// Shares to mint so fee recipients hold `rewards * total_fee / precision`
    /// worth of ether at the post-mint rate:
    ///
    /// `shares = rewards * fee * S / (P * precision - rewards * fee)`
    ///
    /// where `P`/`S` are the pooled ether and shares after the report but
    /// before minting.
    pub fn compute(
        rewards: u128,
        distribution: &RewardDistribution,
        post_pool: u128,
        post_shares: u128,
    ) -> CoreResult<Self> {
        if rewards == 0 || distribution.total_fee == 0 {
            return Ok(Self::default());
        }

        let fee_value = U256::from(rewards)
            .checked_mul(U256::from(distribution.total_fee))
            .ok_or(StakingCoreError::MathOverflow)?;
        let scaled_pool = U256::from(post_pool)
            .checked_mul(U256::from(distribution.precision_points))
            .ok_or(StakingCoreError::MathOverflow)?;
        let denominator = scaled_pool
            .checked_sub(fee_value)
            .ok_or(StakingCoreError::MathUnderflow)?;

        let total_shares = to_u128(mul_div(
            fee_value,
            U256::from(post_shares),
            denominator,
            Rounding::Down,
        )?)?;

        let mut mint = Self {
            total_shares,
            ..Self::default()
        };
        let mut module_total = 0u128;
        for ((id, recipient), fee) in distribution
            .module_ids
            .iter()
            .zip(&distribution.recipients)
            .zip(&distribution.module_fees)
        {
            let shares = mul_div_u128(total_shares, *fee, distribution.total_fee, Rounding::Down)?;
            module_total = safe_add_u128(module_total, shares)?;
            mint.module_shares.push((*id, *recipient, shares));
        }
        mint.treasury_shares = safe_sub_u128(total_shares, module_total)?;

        Ok(mint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_ETHER;

    fn module(id: ModuleId, active: u64) -> ModuleRecord {
        ModuleRecord::new(id, format!("module-{}", id), Address::from_low_u64(id as u64))
            .with_fees(500, 500)
            .with_keys(active, 0)
    }

    #[test]
    fn test_empty_inputs() {
        assert!(distribute(&[]).unwrap().is_empty());
        assert!(distribute(&[module(1, 0), module(2, 0)]).unwrap().is_empty());
    }

    #[test]
    fn test_proportional_split() {
        let result = distribute(&[module(1, 300), module(2, 0), module(3, 100)]).unwrap();

        assert_eq!(result.module_ids, vec![1, 3]);
        // 75% and 25% key share, 5% fee each
        assert_eq!(
            result.module_fees,
            vec![FEE_PRECISION_POINTS * 75 / 100 / 20, FEE_PRECISION_POINTS / 4 / 20]
        );
        assert_eq!(result.total_fee, FEE_PRECISION_POINTS / 10);
        assert_eq!(result.treasury_fee().unwrap(), FEE_PRECISION_POINTS / 20);
    }

    #[test]
    fn test_stopped_module_redirects_to_treasury() {
        let stopped = module(2, 100).with_status(ModuleStatus::Stopped);
        let result = distribute(&[module(1, 100), stopped]).unwrap();

        assert_eq!(result.module_fees[1], 0);
        assert_eq!(result.total_fee, FEE_PRECISION_POINTS / 10);
        assert_eq!(result.treasury_fee().unwrap(), FEE_PRECISION_POINTS * 3 / 40);
    }

    #[test]
    fn test_fee_at_full_precision_rejected() {
        let greedy = module(1, 10).with_fees(5_000, 5_000);
        assert!(matches!(distribute(&[greedy]), Err(StakingCoreError::FeeExceedsTotal { .. })));
    }

    #[test]
    fn test_fee_mint_preserves_fee_value() {
        let distribution = distribute(&[module(1, 1), module(2, 1)]).unwrap();
        let pool = 110 * ONE_ETHER;
        let shares = 100 * ONE_ETHER;
        let rewards = 10 * ONE_ETHER;

        let mint = FeeMint::compute(rewards, &distribution, pool, shares).unwrap();
        let minted_value = mint.total_shares * pool / (shares + mint.total_shares);

        // 10% of 10 ether, up to rounding
        assert!(ONE_ETHER - minted_value < 10);
        assert_eq!(mint.module_shares.len(), 2);
        assert_eq!(mint.module_shares[0].2, mint.module_shares[1].2);
        assert_eq!(
            mint.treasury_shares,
            mint.total_shares - mint.module_shares[0].2 - mint.module_shares[1].2
        );
    }

    #[test]
    fn test_fee_mint_zero_rewards() {
        let distribution = distribute(&[module(1, 1)]).unwrap();
        assert_eq!(FeeMint::compute(0, &distribution, 1, 1).unwrap(), FeeMint::default());
    }
}
