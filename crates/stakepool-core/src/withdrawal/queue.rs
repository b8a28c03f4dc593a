//! # Withdrawal Queue
//!
//! Append-only request ledger with batched finalization. Requests carry
//! cumulative ether/share totals so any id range sums in O(1). Finalizing a
//! batch records the settlement rate in the price history and locks ether in
//! escrow; claims later pay each request at its batch's rate, never more than
//! it originally asked for.

use log::{debug, info, warn};

use crate::errors::{CoreResult, StakingCoreError};
use crate::escrow::Escrow;
use crate::exchange_rate::ExchangeRate;
use crate::math::{safe_add_u128, safe_sub_u128, to_u128};
use crate::types::Address;
use crate::withdrawal::price_history::PriceHistory;
use crate::withdrawal::request::*;

/// Bounds on a single request's ether amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct WithdrawalLimits {
    /// Requests must carry strictly more than this
    pub min: u128,
    /// Requests may carry at most this
    pub max: u128,
}

/// Request ledger, price history and escrow accounting
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct WithdrawalQueue {
    requests: Vec<WithdrawalRequest>,
    prices: PriceHistory,
    finalized_count: u64,
    /// Ether locked in escrow for finalized, unclaimed requests
    total_locked: u128,
    limits: WithdrawalLimits,
}

impl WithdrawalQueue {
    pub fn new(limits: WithdrawalLimits) -> Self {
        Self {
            requests: Vec::new(),
            prices: PriceHistory::new(),
            finalized_count: 0,
            total_locked: 0,
            limits,
        }
    }

    pub fn len(&self) -> u64 {
        self.requests.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn finalized_count(&self) -> u64 {
        self.finalized_count
    }

    pub fn total_locked(&self) -> u128 {
        self.total_locked
    }

    pub fn limits(&self) -> WithdrawalLimits {
        self.limits
    }

    pub fn prices(&self) -> &PriceHistory {
        &self.prices
    }

    pub fn requests(&self) -> &[WithdrawalRequest] {
        &self.requests
    }

    pub fn request(&self, id: u64) -> CoreResult<&WithdrawalRequest> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.requests.get(index))
            .ok_or(StakingCoreError::UnknownRequest(id))
    }

    pub fn status(&self, id: u64) -> CoreResult<RequestStatus> {
        let request = self.request(id)?;
        Ok(if request.claimed {
            RequestStatus::Claimed
        } else if id < self.finalized_count {
            RequestStatus::Finalized
        } else {
            RequestStatus::Queued
        })
    }

    /// Ids of every request addressed to `recipient`
    pub fn requests_of(&self, recipient: &Address) -> Vec<u64> {
        self.requests
            .iter()
            .filter(|r| r.recipient == *recipient)
            .map(|r| r.id)
            .collect()
    }

    /// Ether requested by not yet finalized requests
    pub fn unfinalized_ether(&self) -> CoreResult<u128> {
        self.unfinalized_totals().map(|(ether, _)| ether)
    }

    /// Shares held by not yet finalized requests
    pub fn unfinalized_shares(&self) -> CoreResult<u128> {
        self.unfinalized_totals().map(|(_, shares)| shares)
    }

    /// Append a request, returning its id
    pub fn enqueue(
        &mut self,
        recipient: Address,
        ether_amount: u128,
        shares_amount: u128,
        current_block: u64,
    ) -> CoreResult<u64> {
        if ether_amount <= self.limits.min {
            return Err(StakingCoreError::BelowMinimum {
                amount: ether_amount,
                minimum: self.limits.min,
            });
        }
        if ether_amount > self.limits.max {
            return Err(StakingCoreError::AboveMaximum {
                amount: ether_amount,
                maximum: self.limits.max,
            });
        }

        let (ether_before, shares_before) = self
            .requests
            .last()
            .map(|tail| (tail.cumulative_ether, tail.cumulative_shares))
            .unwrap_or((0, 0));

        let id = self.len();
        let request = WithdrawalRequest {
            id,
            cumulative_ether: safe_add_u128(ether_before, ether_amount)?,
            cumulative_shares: safe_add_u128(shares_before, shares_amount)?,
            recipient,
            created_at_block: current_block,
            claimed: false,
        };
        self.requests.push(request);

        debug!("Enqueued withdrawal {} of {} ether for {}", id, ether_amount, recipient);
        Ok(id)
    }

    /// Preview the escrow lock and share burn for finalizing up to `last_id`
    /// at `pool_value / shares`.
    ///
    /// The lock is the smaller of the requested ether and the shares' value
    /// at the settlement rate.
    pub fn calculate_finalization_params(
        &self,
        last_id: u64,
        pool_value: u128,
        shares: u128,
    ) -> CoreResult<FinalizationParams> {
        self.check_finalization_range(last_id)?;

        let (range_ether, range_shares) = self.range_totals(self.finalized_count, last_id)?;
        let rate = ExchangeRate::from_u128(pool_value, shares)?;
        let ether_to_lock = discounted(range_ether, range_shares, &rate)?;

        Ok(FinalizationParams {
            ether_to_lock,
            shares_to_burn: range_shares,
        })
    }

    /// Finalize every request up to `last_id` at `pool_value / shares`,
    /// locking `ether_to_lock` more ether in escrow.
    ///
    /// `escrow_balance` is the escrow's full balance, including ether already
    /// locked for earlier batches.
    pub fn finalize(
        &mut self,
        last_id: u64,
        ether_to_lock: u128,
        pool_value: u128,
        shares: u128,
        escrow_balance: u128,
    ) -> CoreResult<()> {
        let total_locked =
            self.check_finalize(last_id, ether_to_lock, pool_value, shares, escrow_balance)?;

        self.prices.record(last_id, pool_value, shares)?;
        self.total_locked = total_locked;
        self.finalized_count = last_id + 1;

        info!(
            "Finalized withdrawals up to {} ({} ether locked, {} total)",
            last_id, ether_to_lock, total_locked
        );
        Ok(())
    }

    /// Every check [`Self::finalize`] makes, without touching the queue.
    /// Returns the locked total the batch would leave.
    pub fn check_finalize(
        &self,
        last_id: u64,
        ether_to_lock: u128,
        pool_value: u128,
        shares: u128,
        escrow_balance: u128,
    ) -> CoreResult<u128> {
        self.check_finalization_range(last_id)?;

        let total_locked = safe_add_u128(self.total_locked, ether_to_lock)?;
        if total_locked > escrow_balance {
            return Err(StakingCoreError::InsufficientEscrow {
                required: total_locked,
                available: escrow_balance,
            });
        }

        ExchangeRate::from_u128(pool_value, shares)?.price_e27()?;
        Ok(total_locked)
    }

    /// Reverse linear scan for the price entry of a finalized request
    pub fn find_price_hint(&self, request_id: u64) -> CoreResult<usize> {
        if request_id >= self.finalized_count {
            return Err(StakingCoreError::PriceNotFound(request_id));
        }
        self.prices.find_linear(request_id)
    }

    /// Binary-search variant of [`Self::find_price_hint`]
    pub fn find_price_hint_indexed(&self, request_id: u64) -> CoreResult<usize> {
        if request_id >= self.finalized_count {
            return Err(StakingCoreError::PriceNotFound(request_id));
        }
        self.prices.find_indexed(request_id)
    }

    /// Hints for a batch of requests
    pub fn find_price_hints(&self, request_ids: &[u64]) -> CoreResult<Vec<usize>> {
        request_ids
            .iter()
            .map(|id| self.find_price_hint_indexed(*id))
            .collect()
    }

    /// Ether a claim of `request_id` would pay right now
    pub fn claimable_ether(&self, request_id: u64, hint: Option<usize>) -> CoreResult<u128> {
        let price_index = self.claimable_price_index(request_id, hint)?;
        self.payout(request_id, price_index)
    }

    /// Pay out a finalized request through `escrow`.
    ///
    /// The claimed flag and the locked total only change once the transfer
    /// succeeded; a rejected transfer leaves the request claimable.
    pub fn claim<E: Escrow + ?Sized>(
        &mut self,
        request_id: u64,
        hint: Option<usize>,
        escrow: &mut E,
    ) -> CoreResult<ClaimReceipt> {
        let price_index = self.claimable_price_index(request_id, hint)?;
        let amount = self.payout(request_id, price_index)?;
        let recipient = self.request(request_id)?.recipient;

        let total_locked = safe_sub_u128(self.total_locked, amount).map_err(|_| {
            StakingCoreError::InsufficientEscrow {
                required: amount,
                available: self.total_locked,
            }
        })?;

        if let Err(e) = escrow.transfer(recipient, amount) {
            warn!("Payout for withdrawal {} to {} rejected: {}", request_id, recipient, e);
            return Err(StakingCoreError::TransferFailed {
                request_id,
                amount,
                reason: e.to_string(),
            });
        }

        self.requests[request_id as usize].claimed = true;
        self.total_locked = total_locked;

        info!("Claimed withdrawal {}: {} ether to {}", request_id, amount, recipient);
        Ok(ClaimReceipt {
            request_id,
            recipient,
            amount,
        })
    }

    fn claimable_price_index(&self, request_id: u64, hint: Option<usize>) -> CoreResult<usize> {
        if request_id >= self.finalized_count {
            return Err(StakingCoreError::NotFinalized(request_id));
        }
        if self.request(request_id)?.claimed {
            return Err(StakingCoreError::AlreadyClaimed(request_id));
        }

        match hint {
            Some(hint) if self.prices.is_valid_hint(hint, request_id) => Ok(hint),
            _ => {
                debug!("Price hint {:?} missed for request {}, scanning", hint, request_id);
                self.find_price_hint(request_id)
            }
        }
    }

    fn payout(&self, request_id: u64, price_index: usize) -> CoreResult<u128> {
        let price = self
            .prices
            .get(price_index)
            .ok_or(StakingCoreError::PriceNotFound(request_id))?;
        let (ether, shares) = self.range_totals(request_id, request_id)?;
        discounted(ether, shares, &price.rate()?)
    }

    fn check_finalization_range(&self, last_id: u64) -> CoreResult<()> {
        if last_id < self.finalized_count || last_id >= self.len() {
            return Err(StakingCoreError::InvalidRange {
                last_id,
                finalized: self.finalized_count,
                length: self.len(),
            });
        }
        Ok(())
    }

    /// Ether and shares of requests `from..=to`
    fn range_totals(&self, from: u64, to: u64) -> CoreResult<(u128, u128)> {
        let last = self.request(to)?;
        let (ether_before, shares_before) = if from == 0 {
            (0, 0)
        } else {
            let prev = self.request(from - 1)?;
            (prev.cumulative_ether, prev.cumulative_shares)
        };

        Ok((
            safe_sub_u128(last.cumulative_ether, ether_before)?,
            safe_sub_u128(last.cumulative_shares, shares_before)?,
        ))
    }

    fn unfinalized_totals(&self) -> CoreResult<(u128, u128)> {
        if self.finalized_count == self.len() {
            return Ok((0, 0));
        }
        self.range_totals(self.finalized_count, self.len() - 1)
    }
}

/// `min(ether, value of shares at rate)`
fn discounted(ether: u128, shares: u128, rate: &ExchangeRate) -> CoreResult<u128> {
    let share_value = to_u128(rate.value_for_shares(shares.into())?)?;
    Ok(ether.min(share_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_ETHER;
    use crate::escrow::InMemoryEscrow;

    const E: u128 = ONE_ETHER;

    fn queue() -> WithdrawalQueue {
        WithdrawalQueue::new(WithdrawalLimits { min: 100, max: 1_000 * E })
    }

    fn alice() -> Address {
        Address::from_low_u64(0xa1)
    }

    fn bob() -> Address {
        Address::from_low_u64(0xb0)
    }

    #[test]
    fn test_enqueue_accumulates() {
        let mut queue = queue();
        assert_eq!(queue.enqueue(alice(), 5 * E, 5 * E, 10).unwrap(), 0);
        assert_eq!(queue.enqueue(bob(), 7 * E, 6 * E, 11).unwrap(), 1);

        let tail = queue.request(1).unwrap();
        assert_eq!(tail.cumulative_ether, 12 * E);
        assert_eq!(tail.cumulative_shares, 11 * E);
        assert_eq!(tail.created_at_block, 11);
        assert_eq!(queue.unfinalized_ether().unwrap(), 12 * E);
        assert_eq!(queue.requests_of(&alice()), vec![0]);
    }

    #[test]
    fn test_enqueue_limits() {
        let mut queue = queue();
        assert_eq!(
            queue.enqueue(alice(), 100, 100, 0),
            Err(StakingCoreError::BelowMinimum { amount: 100, minimum: 100 })
        );
        assert!(matches!(
            queue.enqueue(alice(), 1_001 * E, 1, 0),
            Err(StakingCoreError::AboveMaximum { .. })
        ));
        assert!(queue.is_empty());
        assert_eq!(queue.enqueue(alice(), 101, 101, 0).unwrap(), 0);
    }

    #[test]
    fn test_finalization_params_discount() {
        let mut queue = queue();
        queue.enqueue(alice(), 10 * E, 10 * E, 0).unwrap();

        // Rate fell to 0.9: shares are worth less than requested
        let params = queue.calculate_finalization_params(0, 90 * E, 100 * E).unwrap();
        assert_eq!(params.ether_to_lock, 9 * E);
        assert_eq!(params.shares_to_burn, 10 * E);

        // Rate rose to 1.2: never pay more than requested
        let params = queue.calculate_finalization_params(0, 120 * E, 100 * E).unwrap();
        assert_eq!(params.ether_to_lock, 10 * E);
    }

    #[test]
    fn test_finalize_range_and_escrow_checks() {
        let mut queue = queue();
        queue.enqueue(alice(), 5 * E, 5 * E, 0).unwrap();

        assert!(matches!(
            queue.finalize(1, 5 * E, E, E, 5 * E),
            Err(StakingCoreError::InvalidRange { .. })
        ));
        assert_eq!(
            queue.finalize(0, 5 * E, E, E, 4 * E),
            Err(StakingCoreError::InsufficientEscrow { required: 5 * E, available: 4 * E })
        );
        assert!(matches!(
            queue.finalize(0, 5 * E, E, 0, 5 * E),
            Err(StakingCoreError::ZeroShares { .. })
        ));
        assert_eq!(queue.finalized_count(), 0);
        assert_eq!(queue.total_locked(), 0);

        // The dry check agrees with finalize and changes nothing
        assert!(queue.check_finalize(0, 5 * E, E, 0, 5 * E).is_err());
        assert_eq!(queue.check_finalize(0, 5 * E, E, E, 5 * E).unwrap(), 5 * E);
        assert!(queue.prices().is_empty());

        queue.finalize(0, 5 * E, E, E, 5 * E).unwrap();
        assert_eq!(queue.status(0).unwrap(), RequestStatus::Finalized);
        assert!(matches!(
            queue.finalize(0, 0, E, E, 5 * E),
            Err(StakingCoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_claim_pays_and_blocks_double_claim() {
        let mut queue = queue();
        queue.enqueue(alice(), 5 * E, 5 * E, 0).unwrap();
        queue.enqueue(bob(), 7 * E, 7 * E, 0).unwrap();
        queue.finalize(1, 12 * E, 100 * E, 100 * E, 12 * E).unwrap();

        let mut escrow = InMemoryEscrow::with_balance(12 * E);
        let receipt = queue.claim(0, Some(0), &mut escrow).unwrap();
        assert_eq!(receipt.recipient, alice());
        assert_eq!(receipt.amount, 5 * E);
        assert_eq!(queue.total_locked(), 7 * E);
        assert_eq!(queue.status(0).unwrap(), RequestStatus::Claimed);

        let err = queue.claim(0, Some(0), &mut escrow).unwrap_err();
        assert_eq!(err, StakingCoreError::AlreadyClaimed(0));
        assert_eq!(escrow.paid_to(&alice()), 5 * E);
    }

    #[test]
    fn test_claim_unfinalized() {
        let mut queue = queue();
        queue.enqueue(alice(), 5 * E, 5 * E, 0).unwrap();
        let mut escrow = InMemoryEscrow::new();
        assert_eq!(queue.claim(0, None, &mut escrow), Err(StakingCoreError::NotFinalized(0)));
        assert_eq!(queue.claim(9, None, &mut escrow), Err(StakingCoreError::NotFinalized(9)));
        assert_eq!(queue.find_price_hint(0), Err(StakingCoreError::PriceNotFound(0)));
    }

    #[test]
    fn test_rejected_transfer_keeps_request_claimable() {
        let mut queue = queue();
        queue.enqueue(alice(), 5 * E, 5 * E, 0).unwrap();
        queue.finalize(0, 5 * E, E, E, 5 * E).unwrap();

        let mut escrow = InMemoryEscrow::with_balance(5 * E);
        escrow.reject(alice());
        let err = queue.claim(0, Some(0), &mut escrow).unwrap_err();
        assert!(matches!(err, StakingCoreError::TransferFailed { request_id: 0, .. }));
        assert_eq!(queue.status(0).unwrap(), RequestStatus::Finalized);
        assert_eq!(queue.total_locked(), 5 * E);

        escrow.accept(&alice());
        assert_eq!(queue.claim(0, Some(0), &mut escrow).unwrap().amount, 5 * E);
    }

    #[test]
    fn test_claim_uses_batch_rate_and_bad_hint_falls_back() {
        let mut queue = queue();
        queue.enqueue(alice(), 10 * E, 10 * E, 0).unwrap();
        queue.enqueue(bob(), 10 * E, 10 * E, 0).unwrap();

        queue.finalize(0, 10 * E, E, E, 10 * E).unwrap();
        // Second batch settles at a 0.5 rate
        let params = queue.calculate_finalization_params(1, E, 2 * E).unwrap();
        assert_eq!(params.ether_to_lock, 5 * E);
        queue.finalize(1, params.ether_to_lock, E, 2 * E, 15 * E).unwrap();
        assert_eq!(queue.prices().len(), 2);

        assert_eq!(queue.claimable_ether(1, Some(0)).unwrap(), 5 * E);
        assert_eq!(queue.find_price_hints(&[0, 1]).unwrap(), vec![0, 1]);

        let mut escrow = InMemoryEscrow::with_balance(15 * E);
        assert_eq!(queue.claim(1, Some(0), &mut escrow).unwrap().amount, 5 * E);
        assert_eq!(queue.claim(0, Some(7), &mut escrow).unwrap().amount, 10 * E);
        assert_eq!(queue.total_locked(), 0);
    }
}
