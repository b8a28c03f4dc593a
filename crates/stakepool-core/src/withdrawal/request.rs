//! Withdrawal request records.

use crate::types::Address;

/// Lifecycle of a request: `Queued -> Finalized -> Claimed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum RequestStatus {
    Queued,
    Finalized,
    Claimed,
}

/// One entry of the append-only request ledger.
///
/// Amounts are running totals over the whole queue; a request's own amount
/// is the difference with its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct WithdrawalRequest {
    pub id: u64,
    pub cumulative_ether: u128,
    pub cumulative_shares: u128,
    pub recipient: Address,
    pub created_at_block: u64,
    pub claimed: bool,
}

/// Ether and shares covered by a finalization batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct FinalizationParams {
    /// Discounted ether the batch needs locked in escrow
    pub ether_to_lock: u128,
    /// Shares the batch removes from supply
    pub shares_to_burn: u128,
}

/// Result of a successful claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct ClaimReceipt {
    pub request_id: u64,
    pub recipient: Address,
    pub amount: u128,
}
