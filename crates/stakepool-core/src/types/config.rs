//! # Pool Policy Configuration

use crate::constants::*;
use crate::errors::{CoreResult, StakingCoreError};
use crate::types::Address;

/// Policy parameters of one pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", serde(default))]
pub struct PoolConfig {
    /// Per-report positive rebase cap (1e9 = 100%)
    pub max_positive_rebase: u64,
    /// Withdrawal requests must carry strictly more ether than this
    #[cfg_attr(feature = "client", serde(with = "amount_serde"))]
    pub min_withdrawal: u128,
    /// Largest single withdrawal request
    #[cfg_attr(feature = "client", serde(with = "amount_serde"))]
    pub max_withdrawal: u128,
    /// Ether per validator deposit
    #[cfg_attr(feature = "client", serde(with = "amount_serde"))]
    pub deposit_size: u128,
    /// Bound on registered modules
    pub max_modules: usize,
    /// Recipient of the treasury fee share
    pub treasury: Address,
}

impl PoolConfig {
    /// Withdrawal bounds for the queue
    pub fn withdrawal_limits(&self) -> crate::withdrawal::WithdrawalLimits {
        crate::withdrawal::WithdrawalLimits {
            min: self.min_withdrawal,
            max: self.max_withdrawal,
        }
    }

    /// Validate policy parameters
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_positive_rebase == 0 || self.max_positive_rebase > LIMITER_PRECISION_BASE {
            return Err(StakingCoreError::invalid_config(
                "max_positive_rebase",
                self.max_positive_rebase,
                "within (0, 1e9]",
            ));
        }

        if self.max_withdrawal <= self.min_withdrawal {
            return Err(StakingCoreError::invalid_config(
                "max_withdrawal",
                self.max_withdrawal,
                "greater than min_withdrawal",
            ));
        }

        if self.deposit_size == 0 {
            return Err(StakingCoreError::invalid_config("deposit_size", 0, "greater than 0"));
        }

        if self.max_modules == 0 {
            return Err(StakingCoreError::invalid_config("max_modules", 0, "greater than 0"));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_positive_rebase: DEFAULT_MAX_POSITIVE_REBASE,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            max_withdrawal: DEFAULT_MAX_WITHDRAWAL,
            deposit_size: DEFAULT_DEPOSIT_SIZE,
            max_modules: DEFAULT_MAX_MODULES,
            treasury: Address::ZERO,
        }
    }
}

/// Ether amounts as decimal strings; TOML integers stop at `i64::MAX`
#[cfg(feature = "client")]
pub mod amount_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.replace('_', "").parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = PoolConfig::default();
        assert!(config.validate().is_ok());

        config.max_positive_rebase = 0;
        assert!(config.validate().is_err());

        config.max_positive_rebase = LIMITER_PRECISION_BASE + 1;
        assert!(config.validate().is_err());

        config.max_positive_rebase = LIMITER_PRECISION_BASE;
        config.max_withdrawal = config.min_withdrawal;
        assert!(config.validate().is_err());
    }
}
