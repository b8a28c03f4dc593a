//! # Staking Module Types
//!
//! A staking module (venue) is an external, capacity-bounded destination for
//! deposited capital. The registry owns the records; reward distribution and
//! deposit allocation read them as an immutable snapshot.

use crate::constants::TOTAL_BASIS_POINTS;
use crate::errors::{CoreResult, StakingCoreError};
use crate::types::Address;

/// Module identifier
pub type ModuleId = u32;

/// Operational status of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleStatus {
    /// Receives deposits and rewards
    #[default]
    Active,
    /// Receives rewards but no new deposits
    DepositsPaused,
    /// Receives neither; its fee is redirected to the treasury
    Stopped,
}

/// Snapshot of one staking module
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Human readable name for logs
    pub name: String,
    /// Reward recipient
    pub address: Address,
    /// Target share of all active keys (basis points)
    pub target_share_bps: u16,
    /// Operator fee (basis points of rewards)
    pub fee_bps: u16,
    /// Treasury fee (basis points of rewards)
    pub treasury_fee_bps: u16,
    pub status: ModuleStatus,
    /// Keys currently deposited and validating
    pub active_keys: u64,
    /// Keys ready to receive a deposit
    pub available_keys: u64,
    pub last_deposit_block: u64,
}

impl ModuleRecord {
    /// Create an active module with no keys
    pub fn new(id: ModuleId, name: impl Into<String>, address: Address) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            target_share_bps: TOTAL_BASIS_POINTS as u16,
            fee_bps: 0,
            treasury_fee_bps: 0,
            status: ModuleStatus::Active,
            active_keys: 0,
            available_keys: 0,
            last_deposit_block: 0,
        }
    }

    pub fn with_fees(mut self, fee_bps: u16, treasury_fee_bps: u16) -> Self {
        self.fee_bps = fee_bps;
        self.treasury_fee_bps = treasury_fee_bps;
        self
    }

    pub fn with_target_share(mut self, target_share_bps: u16) -> Self {
        self.target_share_bps = target_share_bps;
        self
    }

    pub fn with_keys(mut self, active_keys: u64, available_keys: u64) -> Self {
        self.active_keys = active_keys;
        self.available_keys = available_keys;
        self
    }

    pub fn with_status(mut self, status: ModuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the module may receive new deposits
    pub fn accepts_deposits(&self) -> bool {
        self.status == ModuleStatus::Active
    }

    /// Validate share and fee parameters
    pub fn validate(&self) -> CoreResult<()> {
        if u128::from(self.target_share_bps) > TOTAL_BASIS_POINTS {
            return Err(StakingCoreError::invalid_config(
                "target_share_bps",
                self.target_share_bps,
                "at most 10000 (100%)",
            ));
        }

        let total_fee = u128::from(self.fee_bps) + u128::from(self.treasury_fee_bps);
        if total_fee > TOTAL_BASIS_POINTS {
            return Err(StakingCoreError::invalid_config(
                "fee_bps + treasury_fee_bps",
                total_fee,
                "at most 10000 (100%)",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_validation() {
        let module = ModuleRecord::new(1, "curated", Address::from_low_u64(1)).with_fees(500, 500);
        assert!(module.validate().is_ok());

        let too_greedy = module.clone().with_fees(9_000, 1_001);
        assert!(too_greedy.validate().is_err());

        let oversized = module.with_target_share(10_001);
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_deposit_eligibility() {
        let module = ModuleRecord::new(1, "curated", Address::ZERO);
        assert!(module.accepts_deposits());
        assert!(!module.clone().with_status(ModuleStatus::DepositsPaused).accepts_deposits());
        assert!(!module.with_status(ModuleStatus::Stopped).accepts_deposits());
    }
}
