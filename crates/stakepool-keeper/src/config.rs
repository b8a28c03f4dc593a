use std::collections::BTreeSet;
use std::fs;

use serde::{Deserialize, Serialize};
use stakepool_core::{Address, ModuleId, ModuleRecord, ModuleStatus, PoolConfig, Role, ONE_ETHER};

use crate::error::{KeeperError, KeeperResult};

/// Keeper configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeeperConfig {
    /// Holder of the admin role
    pub admin: Address,

    /// JSON-lines journal of pool events to replay
    pub journal_path: String,

    /// Where the pool snapshot is persisted between runs
    pub snapshot_path: String,

    /// Seconds between journal polls
    pub poll_interval: u64,

    /// Pool policy
    pub pool: PoolConfig,

    /// Staking modules registered on a fresh pool
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Role grants applied on a fresh pool
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

/// Configuration for individual staking module
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleConfig {
    pub id: ModuleId,

    /// Module name for logging
    pub name: String,

    /// Reward recipient
    pub address: Address,

    /// Target share of active keys (basis points)
    pub target_share_bps: u16,

    /// Operator fee (basis points)
    pub fee_bps: u16,

    /// Treasury fee (basis points)
    pub treasury_fee_bps: u16,

    /// Keys ready for deposits
    #[serde(default)]
    pub available_keys: u64,

    #[serde(default)]
    pub status: ModuleStatus,
}

/// A role granted to an address at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoleGrant {
    pub address: Address,
    pub role: Role,
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> KeeperResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KeeperError::Io(format!("Failed to read config file {}: {}", path, e)))?;

        let config: KeeperConfig = toml::from_str(&content).map_err(|e| {
            KeeperError::InvalidConfig(format!("Failed to parse config file {}: {}", path, e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> KeeperResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| KeeperError::Io(format!("Failed to write config file {}: {}", path, e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        self.pool.validate()?;

        if self.admin.is_zero() {
            return Err(KeeperError::InvalidConfig(
                "admin must not be the zero address".to_string(),
            ));
        }

        if self.journal_path.is_empty() || self.snapshot_path.is_empty() {
            return Err(KeeperError::InvalidConfig(
                "journal_path and snapshot_path are required".to_string(),
            ));
        }

        if self.poll_interval == 0 {
            return Err(KeeperError::InvalidConfig(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.modules.len() > self.pool.max_modules {
            return Err(KeeperError::InvalidConfig(format!(
                "{} modules configured, pool allows {}",
                self.modules.len(),
                self.pool.max_modules
            )));
        }

        let mut ids = BTreeSet::new();
        for module in &self.modules {
            if !ids.insert(module.id) {
                return Err(KeeperError::InvalidConfig(format!(
                    "duplicate module id {}",
                    module.id
                )));
            }
            module.to_record().validate()?;
        }

        Ok(())
    }
}

impl ModuleConfig {
    /// Registry record for this module, with no active keys yet
    pub fn to_record(&self) -> ModuleRecord {
        ModuleRecord::new(self.id, self.name.clone(), self.address)
            .with_target_share(self.target_share_bps)
            .with_fees(self.fee_bps, self.treasury_fee_bps)
            .with_keys(0, self.available_keys)
            .with_status(self.status)
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            admin: Address::repeat_byte(0x01),
            journal_path: "pool-events.jsonl".to_string(),
            snapshot_path: "pool-snapshot.json".to_string(),
            poll_interval: 12,
            pool: PoolConfig {
                treasury: Address::repeat_byte(0xee),
                ..PoolConfig::default()
            },
            modules: vec![],
            roles: vec![],
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Default Module".to_string(),
            address: Address::from_low_u64(1),
            target_share_bps: 10_000,
            fee_bps: 500,
            treasury_fee_bps: 500,
            available_keys: 0,
            status: ModuleStatus::Active,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> KeeperResult<()> {
    let admin = Address::repeat_byte(0x01);
    let example_config = KeeperConfig {
        admin,
        pool: PoolConfig {
            max_positive_rebase: 750_000,
            min_withdrawal: 100,
            max_withdrawal: 1_000 * ONE_ETHER,
            deposit_size: 32 * ONE_ETHER,
            max_modules: 32,
            treasury: Address::repeat_byte(0xee),
        },
        modules: vec![
            ModuleConfig {
                id: 1,
                name: "curated".to_string(),
                address: Address::repeat_byte(0x11),
                target_share_bps: 10_000,
                fee_bps: 500,
                treasury_fee_bps: 500,
                available_keys: 1_000,
                status: ModuleStatus::Active,
            },
            ModuleConfig {
                id: 2,
                name: "community".to_string(),
                address: Address::repeat_byte(0x22),
                target_share_bps: 400,
                fee_bps: 600,
                treasury_fee_bps: 400,
                available_keys: 200,
                status: ModuleStatus::Active,
            },
        ],
        roles: vec![
            RoleGrant { address: Address::repeat_byte(0x02), role: Role::Oracle },
            RoleGrant { address: Address::repeat_byte(0x03), role: Role::Depositor },
            RoleGrant { address: admin, role: Role::ModuleManager },
        ],
        ..KeeperConfig::default()
    };

    example_config.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = KeeperConfig::default();
        config.modules.push(ModuleConfig::default());
        assert!(config.validate().is_ok());

        // Duplicate module ids
        config.modules.push(ModuleConfig::default());
        assert!(config.validate().is_err());
        config.modules.pop();

        // Fees above 100%
        config.modules[0].fee_bps = 9_600;
        assert!(config.validate().is_err());
        config.modules[0].fee_bps = 500;

        config.poll_interval = 0;
        assert!(config.validate().is_err());
        config.poll_interval = 12;

        config.pool.max_positive_rebase = 0;
        assert!(matches!(config.validate(), Err(KeeperError::Pool(_))));
    }

    #[test]
    fn test_example_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");
        let path = path.to_str().unwrap();

        create_example_config(path).unwrap();
        let loaded = KeeperConfig::load(path).unwrap();

        assert_eq!(loaded.modules.len(), 2);
        assert_eq!(loaded.pool.max_withdrawal, 1_000 * ONE_ETHER);
        assert_eq!(loaded.roles[0].role, Role::Oracle);
        assert_eq!(loaded.admin, Address::repeat_byte(0x01));
    }
}
