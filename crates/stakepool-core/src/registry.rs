//! # Module Registry
//!
//! Owns the staking module records. Writers go through the registry;
//! readers take [`ModuleRegistry::snapshot`], an immutable `Arc` slice that
//! is rebuilt after every write and can be shared freely across threads.

use std::sync::Arc;

use log::info;

use crate::errors::{CoreResult, StakingCoreError};
use crate::math::{safe_add_u64, safe_sub_u64};
use crate::types::{ModuleId, ModuleRecord, ModuleStatus};

/// Bounded set of staking modules
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    modules: Vec<ModuleRecord>,
    max_modules: usize,
    cache: Arc<[ModuleRecord]>,
}

impl ModuleRegistry {
    pub fn new(max_modules: usize) -> CoreResult<Self> {
        if max_modules == 0 {
            return Err(StakingCoreError::invalid_config("max_modules", 0, "greater than 0"));
        }
        Ok(Self {
            modules: Vec::new(),
            max_modules,
            cache: Arc::from(Vec::new()),
        })
    }

    /// Rebuild a registry from persisted records, re-validating each
    pub fn from_records(max_modules: usize, records: Vec<ModuleRecord>) -> CoreResult<Self> {
        let mut registry = Self::new(max_modules)?;
        for record in records {
            registry.add_module(record)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn max_modules(&self) -> usize {
        self.max_modules
    }

    pub fn get(&self, id: ModuleId) -> CoreResult<&ModuleRecord> {
        self.modules
            .iter()
            .find(|m| m.id == id)
            .ok_or(StakingCoreError::UnknownModule(id))
    }

    /// Immutable view of all modules in registration order
    pub fn snapshot(&self) -> Arc<[ModuleRecord]> {
        Arc::clone(&self.cache)
    }

    pub fn add_module(&mut self, record: ModuleRecord) -> CoreResult<()> {
        if self.modules.len() >= self.max_modules {
            return Err(StakingCoreError::TooManyModules(self.modules.len() + 1, self.max_modules));
        }
        if self.modules.iter().any(|m| m.id == record.id) {
            return Err(StakingCoreError::DuplicateModule(record.id));
        }
        record.validate()?;

        info!("Registered module {} ({}) at {}", record.id, record.name, record.address);
        self.modules.push(record);
        self.refresh();
        Ok(())
    }

    pub fn set_status(&mut self, id: ModuleId, status: ModuleStatus) -> CoreResult<()> {
        let module = self.get_mut(id)?;
        if module.status != status {
            info!("Module {} status {:?} -> {:?}", id, module.status, status);
            module.status = status;
        }
        self.refresh();
        Ok(())
    }

    pub fn update_fees(
        &mut self,
        id: ModuleId,
        fee_bps: u16,
        treasury_fee_bps: u16,
    ) -> CoreResult<()> {
        let updated = self.get(id)?.clone().with_fees(fee_bps, treasury_fee_bps);
        updated.validate()?;
        *self.get_mut(id)? = updated;
        self.refresh();
        Ok(())
    }

    pub fn update_target_share(&mut self, id: ModuleId, target_share_bps: u16) -> CoreResult<()> {
        let updated = self.get(id)?.clone().with_target_share(target_share_bps);
        updated.validate()?;
        *self.get_mut(id)? = updated;
        self.refresh();
        Ok(())
    }

    pub fn update_keys(
        &mut self,
        id: ModuleId,
        active_keys: u64,
        available_keys: u64,
    ) -> CoreResult<()> {
        let module = self.get_mut(id)?;
        module.active_keys = active_keys;
        module.available_keys = available_keys;
        self.refresh();
        Ok(())
    }

    /// Move `count` keys of `id` from available to active
    pub fn record_deposits(&mut self, id: ModuleId, count: u64, block: u64) -> CoreResult<()> {
        let module = self.get(id)?;
        let available = safe_sub_u64(module.available_keys, count)?;
        let active = safe_add_u64(module.active_keys, count)?;

        let module = self.get_mut(id)?;
        module.available_keys = available;
        module.active_keys = active;
        module.last_deposit_block = block;
        self.refresh();
        Ok(())
    }

    fn get_mut(&mut self, id: ModuleId) -> CoreResult<&mut ModuleRecord> {
        self.modules
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StakingCoreError::UnknownModule(id))
    }

    fn refresh(&mut self) {
        self.cache = Arc::from(self.modules.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn module(id: ModuleId) -> ModuleRecord {
        ModuleRecord::new(id, format!("module-{}", id), Address::from_low_u64(id as u64))
    }

    #[test]
    fn test_bounded_and_unique() {
        let mut registry = ModuleRegistry::new(2).unwrap();
        registry.add_module(module(1)).unwrap();
        assert_eq!(registry.add_module(module(1)), Err(StakingCoreError::DuplicateModule(1)));
        registry.add_module(module(2)).unwrap();
        assert_eq!(registry.add_module(module(3)), Err(StakingCoreError::TooManyModules(3, 2)));
        assert!(ModuleRegistry::new(0).is_err());
    }

    #[test]
    fn test_invalid_fees_rejected() {
        let mut registry = ModuleRegistry::new(4).unwrap();
        assert!(registry.add_module(module(1).with_fees(6_000, 5_000)).is_err());
        assert!(registry.is_empty());

        registry.add_module(module(1)).unwrap();
        assert!(registry.update_fees(1, 6_000, 5_000).is_err());
        assert_eq!(registry.get(1).unwrap().fee_bps, 0);
        registry.update_fees(1, 500, 500).unwrap();
        assert_eq!(registry.get(1).unwrap().fee_bps, 500);
    }

    #[test]
    fn test_snapshot_is_stable_across_writes() {
        let mut registry = ModuleRegistry::new(4).unwrap();
        registry.add_module(module(1).with_keys(0, 5)).unwrap();
        let before = registry.snapshot();

        registry.record_deposits(1, 3, 77).unwrap();
        assert_eq!(before[0].active_keys, 0);

        let after = registry.snapshot();
        assert_eq!(after[0].active_keys, 3);
        assert_eq!(after[0].available_keys, 2);
        assert_eq!(after[0].last_deposit_block, 77);
        assert!(registry.record_deposits(1, 3, 78).is_err());
    }

    #[test]
    fn test_target_share_and_key_updates() {
        let mut registry = ModuleRegistry::new(4).unwrap();
        registry.add_module(module(1).with_keys(4, 0)).unwrap();

        assert!(registry.update_target_share(1, 10_001).is_err());
        registry.update_target_share(1, 2_500).unwrap();
        assert_eq!(registry.snapshot()[0].target_share_bps, 2_500);

        // Topping up keys once the deposited ones ran out
        registry.update_keys(1, 4, 12).unwrap();
        registry.record_deposits(1, 12, 5).unwrap();
        assert_eq!(registry.get(1).unwrap().active_keys, 16);
    }

    #[test]
    fn test_unknown_module() {
        let mut registry = ModuleRegistry::new(1).unwrap();
        assert_eq!(
            registry.set_status(9, ModuleStatus::Stopped),
            Err(StakingCoreError::UnknownModule(9))
        );
    }
}
