//! # Escrow Collaborator
//!
//! The ledger holding the ether locked for finalized withdrawals. The core
//! only needs its balance and a payment primitive that may fail.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::errors::CoreResult;
use crate::math::{safe_add_u128, safe_sub_u128};
use crate::types::Address;

/// A payment rejected by the escrow or the recipient
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransferError(pub String);

/// Holder of withdrawal funds
pub trait Escrow {
    /// Ether currently held
    fn balance(&self) -> u128;

    /// Receive ether moved out of the pool
    fn fund(&mut self, amount: u128) -> CoreResult<()>;

    /// Pay `amount` to `to`. On error nothing moved.
    fn transfer(&mut self, to: Address, amount: u128) -> Result<(), TransferError>;
}

/// Escrow kept in memory, crediting recipients in a ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct InMemoryEscrow {
    balance: u128,
    paid: BTreeMap<Address, u128>,
    #[cfg_attr(feature = "client", serde(default))]
    rejecting: BTreeSet<Address>,
}

impl InMemoryEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(balance: u128) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Total paid out to `recipient`
    pub fn paid_to(&self, recipient: &Address) -> u128 {
        self.paid.get(recipient).copied().unwrap_or(0)
    }

    /// Total paid out to everyone
    pub fn total_paid(&self) -> u128 {
        self.paid.values().sum()
    }

    /// Make payments to `recipient` fail until [`Self::accept`] is called
    pub fn reject(&mut self, recipient: Address) {
        self.rejecting.insert(recipient);
    }

    pub fn accept(&mut self, recipient: &Address) {
        self.rejecting.remove(recipient);
    }
}

impl Escrow for InMemoryEscrow {
    fn balance(&self) -> u128 {
        self.balance
    }

    fn fund(&mut self, amount: u128) -> CoreResult<()> {
        self.balance = safe_add_u128(self.balance, amount)?;
        Ok(())
    }

    fn transfer(&mut self, to: Address, amount: u128) -> Result<(), TransferError> {
        if self.rejecting.contains(&to) {
            return Err(TransferError(format!("recipient {} rejected payment", to)));
        }

        let balance = safe_sub_u128(self.balance, amount)
            .map_err(|_| TransferError(format!("escrow holds {} of {}", self.balance, amount)))?;
        let credited = safe_add_u128(self.paid_to(&to), amount)
            .map_err(|e| TransferError(e.to_string()))?;

        self.balance = balance;
        self.paid.insert(to, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_moves_funds() {
        let mut escrow = InMemoryEscrow::with_balance(10);
        let alice = Address::from_low_u64(1);

        escrow.transfer(alice, 4).unwrap();
        assert_eq!(escrow.balance(), 6);
        assert_eq!(escrow.paid_to(&alice), 4);
        assert!(escrow.transfer(alice, 7).is_err());
        assert_eq!(escrow.balance(), 6);
    }

    #[test]
    fn test_rejecting_recipient() {
        let mut escrow = InMemoryEscrow::with_balance(10);
        let bob = Address::from_low_u64(2);

        escrow.reject(bob);
        assert!(escrow.transfer(bob, 1).is_err());
        assert_eq!(escrow.balance(), 10);

        escrow.accept(&bob);
        escrow.transfer(bob, 1).unwrap();
        assert_eq!(escrow.total_paid(), 1);
    }
}
