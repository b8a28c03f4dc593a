//! # Access Control
//!
//! Role grants and the capabilities derived from them. A [`Permit`] can only
//! be obtained from [`AccessControl::permit`], so holding one proves the
//! grant existed when it was issued. Mutating entry points check the permit;
//! the accounting itself never looks at callers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::info;

use crate::errors::{CoreResult, StakingCoreError};
use crate::types::Address;

/// Privileged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", serde(rename_all = "snake_case"))]
pub enum Role {
    /// Grants and revokes roles
    Admin,
    /// Submits oracle reports
    Oracle,
    /// Adds modules and changes their status, fees and keys
    ModuleManager,
    /// Moves buffered ether into modules
    Depositor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Oracle => "oracle",
            Role::ModuleManager => "module_manager",
            Role::Depositor => "depositor",
        };
        write!(f, "{}", name)
    }
}

/// Proof that `holder` was granted `role`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    holder: Address,
    role: Role,
}

impl Permit {
    pub fn holder(&self) -> Address {
        self.holder
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Fail unless this permit is for `role`
    pub fn require(&self, role: Role) -> CoreResult<()> {
        if self.role != role {
            return Err(unauthorized(self.holder, role));
        }
        Ok(())
    }
}

/// Role grants per address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControl {
    grants: BTreeMap<Address, BTreeSet<Role>>,
}

impl AccessControl {
    /// Start with `admin` holding [`Role::Admin`]
    pub fn new(admin: Address) -> Self {
        let mut access = Self::default();
        access.grants.entry(admin).or_default().insert(Role::Admin);
        access
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.grants.get(account).is_some_and(|roles| roles.contains(&role))
    }

    /// Issue a permit if `account` holds `role`
    pub fn permit(&self, account: Address, role: Role) -> CoreResult<Permit> {
        if !self.has_role(&account, role) {
            return Err(unauthorized(account, role));
        }
        Ok(Permit { holder: account, role })
    }

    /// Check that a previously issued permit has not been revoked since
    pub fn verify(&self, permit: &Permit, role: Role) -> CoreResult<()> {
        permit.require(role)?;
        if !self.has_role(&permit.holder, role) {
            return Err(unauthorized(permit.holder, role));
        }
        Ok(())
    }

    pub fn grant(&mut self, admin: &Permit, account: Address, role: Role) -> CoreResult<()> {
        self.verify(admin, Role::Admin)?;
        if self.grants.entry(account).or_default().insert(role) {
            info!("Granted {} to {}", role, account);
        }
        Ok(())
    }

    pub fn revoke(&mut self, admin: &Permit, account: &Address, role: Role) -> CoreResult<()> {
        self.verify(admin, Role::Admin)?;
        if let Some(roles) = self.grants.get_mut(account) {
            if roles.remove(&role) {
                info!("Revoked {} from {}", role, account);
            }
            if roles.is_empty() {
                self.grants.remove(account);
            }
        }
        Ok(())
    }
}

fn unauthorized(caller: Address, role: Role) -> StakingCoreError {
    StakingCoreError::Unauthorized {
        caller: caller.to_string(),
        role: role.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits_follow_grants() {
        let admin = Address::from_low_u64(1);
        let oracle = Address::from_low_u64(2);
        let mut access = AccessControl::new(admin);

        assert!(access.permit(oracle, Role::Oracle).is_err());

        let admin_permit = access.permit(admin, Role::Admin).unwrap();
        access.grant(&admin_permit, oracle, Role::Oracle).unwrap();
        let oracle_permit = access.permit(oracle, Role::Oracle).unwrap();
        assert!(access.verify(&oracle_permit, Role::Oracle).is_ok());
        assert!(access.verify(&oracle_permit, Role::Depositor).is_err());

        // Oracle cannot grant roles
        assert!(access.grant(&oracle_permit, oracle, Role::Admin).is_err());

        access.revoke(&admin_permit, &oracle, Role::Oracle).unwrap();
        assert!(matches!(
            access.verify(&oracle_permit, Role::Oracle),
            Err(StakingCoreError::Unauthorized { .. })
        ));
    }
}
