//! # Deposit Allocation
//!
//! Turns the module snapshot into min-first buckets: each module's fill
//! level is its active key count, its capacity the policy target
//! `target_share_bps * (total_active + deposits) / 10000`, capped by the
//! keys it physically has (`active + available`). Modules that do not
//! accept deposits keep their current count as capacity.

use log::debug;

use crate::allocation::min_first::allocate;
use crate::constants::TOTAL_BASIS_POINTS;
use crate::errors::{CoreResult, StakingCoreError};
use crate::math::{mul_div_u128, safe_add_u64, safe_div_u128, safe_sum_u64, Rounding};
use crate::types::{ModuleId, ModuleRecord};

/// Result of spreading new deposits over modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositAllocation {
    /// Deposits actually placed
    pub allocated: u64,
    pub module_ids: Vec<ModuleId>,
    /// Active key count of each module after the deposits
    pub counts: Vec<u64>,
    /// New deposits per module
    pub deposits: Vec<u64>,
}

impl DepositAllocation {
    /// New deposits assigned to `module_id`
    pub fn deposits_for(&self, module_id: ModuleId) -> CoreResult<u64> {
        self.module_ids
            .iter()
            .position(|id| *id == module_id)
            .map(|index| self.deposits[index])
            .ok_or(StakingCoreError::UnknownModule(module_id))
    }
}

/// Spread `deposits` new validator deposits over `modules`
pub fn deposit_allocation(
    modules: &[ModuleRecord],
    deposits: u64,
) -> CoreResult<DepositAllocation> {
    let counts: Vec<u64> = modules.iter().map(|m| m.active_keys).collect();
    let total_active = safe_sum_u64(&counts)?;
    let projected = safe_add_u64(total_active, deposits)?;

    let capacities = modules
        .iter()
        .map(|module| target_capacity(module, projected))
        .collect::<CoreResult<Vec<u64>>>()?;

    let (allocated, new_counts) = allocate(&counts, &capacities, deposits)?;
    let per_module = new_counts
        .iter()
        .zip(&counts)
        .map(|(after, before)| after.saturating_sub(*before))
        .collect();

    debug!("Allocated {} of {} deposits over {} modules", allocated, deposits, modules.len());
    Ok(DepositAllocation {
        allocated,
        module_ids: modules.iter().map(|m| m.id).collect(),
        counts: new_counts,
        deposits: per_module,
    })
}

/// Deposits `module_id` may take out of `max_deposit_value` ether
pub fn max_deposits_for(
    modules: &[ModuleRecord],
    module_id: ModuleId,
    max_deposit_value: u128,
    deposit_size: u128,
) -> CoreResult<u64> {
    if !modules.iter().any(|m| m.id == module_id) {
        return Err(StakingCoreError::UnknownModule(module_id));
    }

    let deposits = safe_div_u128(max_deposit_value, deposit_size)?;
    let deposits = u64::try_from(deposits).unwrap_or(u64::MAX);
    deposit_allocation(modules, deposits)?.deposits_for(module_id)
}

fn target_capacity(module: &ModuleRecord, projected_active: u64) -> CoreResult<u64> {
    if !module.accepts_deposits() {
        return Ok(module.active_keys);
    }

    let target = mul_div_u128(
        u128::from(module.target_share_bps),
        u128::from(projected_active),
        TOTAL_BASIS_POINTS,
        Rounding::Down,
    )?;
    let physical = u128::from(module.active_keys) + u128::from(module.available_keys);

    u64::try_from(target.min(physical)).map_err(|_| StakingCoreError::ConversionError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_ETHER;
    use crate::types::{Address, ModuleStatus};

    fn module(id: ModuleId, active: u64, available: u64, target_bps: u16) -> ModuleRecord {
        ModuleRecord::new(id, format!("module-{}", id), Address::from_low_u64(id as u64))
            .with_keys(active, available)
            .with_target_share(target_bps)
    }

    #[test]
    fn test_target_share_caps_module() {
        // Projected 100 keys: module 1 may hold 10, module 2 up to 100
        let modules = [module(1, 0, 50, 1_000), module(2, 0, 100, 10_000)];
        let result = deposit_allocation(&modules, 100).unwrap();

        assert_eq!(result.allocated, 100);
        assert_eq!(result.deposits, vec![10, 90]);
        assert_eq!(result.deposits_for(2).unwrap(), 90);
    }

    #[test]
    fn test_available_keys_cap_module() {
        let modules = [module(1, 5, 2, 10_000), module(2, 5, 1, 10_000)];
        let result = deposit_allocation(&modules, 10).unwrap();

        assert_eq!(result.allocated, 3);
        assert_eq!(result.counts, vec![7, 6]);
    }

    #[test]
    fn test_paused_module_gets_nothing() {
        let paused = module(1, 0, 10, 10_000).with_status(ModuleStatus::DepositsPaused);
        let modules = [paused, module(2, 3, 10, 10_000)];
        let result = deposit_allocation(&modules, 4).unwrap();

        assert_eq!(result.deposits, vec![0, 4]);
    }

    #[test]
    fn test_unvalidated_record_does_not_truncate() {
        // Target above 100% and more keys than a u64 count can hold
        let oversized = ModuleRecord::new(1, "oversized", Address::from_low_u64(1))
            .with_keys(u64::MAX, 1)
            .with_target_share(20_000);
        assert_eq!(
            deposit_allocation(&[oversized], 0),
            Err(StakingCoreError::ConversionError)
        );
    }

    #[test]
    fn test_max_deposits_for() {
        let modules = [module(1, 0, 10, 10_000), module(2, 0, 10, 10_000)];
        assert_eq!(max_deposits_for(&modules, 1, 130 * ONE_ETHER, 32 * ONE_ETHER).unwrap(), 2);
        assert_eq!(max_deposits_for(&modules, 2, 130 * ONE_ETHER, 32 * ONE_ETHER).unwrap(), 2);
        assert_eq!(
            max_deposits_for(&modules, 3, ONE_ETHER, 32 * ONE_ETHER),
            Err(StakingCoreError::UnknownModule(3))
        );
    }
}
