//! # Staking Pool
//!
//! The report-driven accounting engine tying the limiter, the withdrawal
//! queue, reward distribution and deposit allocation together.
//!
//! Pooled ether is `buffered_ether + staked_ether`. Shares of pending
//! withdrawals stay in supply until their batch is finalized; at that point
//! the share equivalent of the locked ether is burned immediately, and the
//! rest (the discount that lifts the rate) is burned only as far as the
//! rebase budget allows, carrying the remainder into later reports.
//!
//! Every mutating operation is all-or-nothing: a report is planned in full
//! and only applied once the escrow accepted the funds.

use std::collections::BTreeMap;

use ethnum::U256;
use log::{debug, info, warn};

use crate::allocation::{deposit_allocation, DepositAllocation};
use crate::constants::SNAPSHOT_SCHEMA_VERSION;
use crate::errors::{CoreResult, StakingCoreError};
use crate::escrow::Escrow;
use crate::exchange_rate::ExchangeRate;
use crate::limiter::LimiterState;
use crate::math::*;
use crate::registry::ModuleRegistry;
use crate::rewards::{distribute, FeeMint};
use crate::types::{Address, ModuleRecord, OracleReport, PoolConfig};
use crate::withdrawal::{ClaimReceipt, FinalizationParams, WithdrawalQueue};

/// What one report did to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportOutcome {
    pub ref_block: u64,
    pub consensus_delta: i128,
    pub execution_rewards_applied: u128,
    /// Execution rewards left outside the pool by the rebase limit
    pub execution_rewards_deferred: u128,
    pub finalization: Option<FinalizationParams>,
    pub shares_burned: u128,
    /// Finalized shares still waiting to be burned
    pub pending_burn_shares: u128,
    pub fee_mint: FeeMint,
    pub limiter_used: u64,
    pub limiter_max: u64,
    pub pool_value: u128,
    pub total_shares: u128,
}

/// Versioned, serializable pool state
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSnapshot {
    pub schema_version: u16,
    pub config: PoolConfig,
    pub buffered_ether: u128,
    pub staked_ether: u128,
    pub total_shares: u128,
    pub queued_shares: u128,
    pub pending_burn_shares: u128,
    pub balances: BTreeMap<Address, u128>,
    pub queue: WithdrawalQueue,
    pub modules: Vec<ModuleRecord>,
    pub last_report_block: Option<u64>,
}

/// Scalar pool accounting a report works on
#[derive(Debug, Clone, Copy)]
struct Totals {
    buffered_ether: u128,
    staked_ether: u128,
    total_shares: u128,
    queued_shares: u128,
    pending_burn_shares: u128,
}

impl Totals {
    fn pool_value(&self) -> u128 {
        self.buffered_ether.saturating_add(self.staked_ether)
    }
}

/// A withdrawal batch validated against the planned totals
#[derive(Debug, Clone, Copy)]
struct FinalizationBatch {
    last_id: u64,
    params: FinalizationParams,
    /// Settlement rate of the batch
    pool_value: u128,
    shares: u128,
}

/// Everything a report changes, computed before any of it is applied
struct ReportPlan {
    registry: Option<ModuleRegistry>,
    totals: Totals,
    batch: Option<FinalizationBatch>,
    credits: BTreeMap<Address, u128>,
    outcome: ReportOutcome,
}

/// Liquid staking accounting state
#[derive(Debug, Clone)]
pub struct StakingPool {
    config: PoolConfig,
    buffered_ether: u128,
    /// Consensus-layer balance, including deposited validators
    staked_ether: u128,
    total_shares: u128,
    /// Shares held by unfinalized withdrawal requests
    queued_shares: u128,
    /// Shares of finalized requests not burned yet
    pending_burn_shares: u128,
    balances: BTreeMap<Address, u128>,
    queue: WithdrawalQueue,
    registry: ModuleRegistry,
    last_report_block: Option<u64>,
}

impl StakingPool {
    pub fn new(config: PoolConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            buffered_ether: 0,
            staked_ether: 0,
            total_shares: 0,
            queued_shares: 0,
            pending_burn_shares: 0,
            balances: BTreeMap::new(),
            queue: WithdrawalQueue::new(config.withdrawal_limits()),
            registry: ModuleRegistry::new(config.max_modules)?,
            last_report_block: None,
            config,
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn pool_value(&self) -> u128 {
        self.buffered_ether.saturating_add(self.staked_ether)
    }

    pub fn buffered_ether(&self) -> u128 {
        self.buffered_ether
    }

    pub fn staked_ether(&self) -> u128 {
        self.staked_ether
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn queued_shares(&self) -> u128 {
        self.queued_shares
    }

    pub fn pending_burn_shares(&self) -> u128 {
        self.pending_burn_shares
    }

    pub fn last_report_block(&self) -> Option<u64> {
        self.last_report_block
    }

    pub fn rate(&self) -> CoreResult<ExchangeRate> {
        ExchangeRate::from_u128(self.pool_value(), self.total_shares)
    }

    pub fn shares_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Ether value of `account`'s shares at the current rate
    pub fn value_of(&self, account: &Address) -> CoreResult<u128> {
        let shares = self.shares_of(account);
        if shares == 0 {
            return Ok(0);
        }
        to_u128(self.rate()?.value_for_shares(U256::from(shares))?)
    }

    pub fn queue(&self) -> &WithdrawalQueue {
        &self.queue
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Deposit `amount` ether for `sender`, returning the shares minted
    pub fn submit(&mut self, sender: Address, amount: u128) -> CoreResult<u128> {
        let shares = if self.total_shares == 0 {
            amount
        } else {
            to_u128(self.rate()?.shares_for_value(U256::from(amount))?)?
        };
        if shares == 0 {
            return Err(StakingCoreError::BelowMinimum { amount, minimum: 0 });
        }

        let buffered = safe_add_u128(self.buffered_ether, amount)?;
        let total_shares = safe_add_u128(self.total_shares, shares)?;
        let balance = safe_add_u128(self.shares_of(&sender), shares)?;

        self.buffered_ether = buffered;
        self.total_shares = total_shares;
        self.balances.insert(sender, balance);

        debug!("Submitted {} ether from {} for {} shares", amount, sender, shares);
        Ok(shares)
    }

    /// Queue `shares` of `owner` for withdrawal at the current rate
    pub fn request_withdrawal(
        &mut self,
        owner: Address,
        shares: u128,
        block: u64,
    ) -> CoreResult<u64> {
        let balance = self.shares_of(&owner);
        let remaining =
            safe_sub_u128(balance, shares).map_err(|_| StakingCoreError::InsufficientShares {
                required: shares,
                available: balance,
            })?;
        let ether = to_u128(self.rate()?.value_for_shares(U256::from(shares))?)?;
        let queued_shares = safe_add_u128(self.queued_shares, shares)?;

        let id = self.queue.enqueue(owner, ether, shares, block)?;
        self.queued_shares = queued_shares;
        if remaining == 0 {
            self.balances.remove(&owner);
        } else {
            self.balances.insert(owner, remaining);
        }
        Ok(id)
    }

    /// Pay out a finalized withdrawal request
    pub fn claim<E: Escrow + ?Sized>(
        &mut self,
        request_id: u64,
        hint: Option<usize>,
        escrow: &mut E,
    ) -> CoreResult<ClaimReceipt> {
        self.queue.claim(request_id, hint, escrow)
    }

    // ========================================================================
    // Operator Operations
    // ========================================================================

    /// Move up to `max_deposits` validator deposits out of the buffer,
    /// keeping enough ether buffered for unfinalized withdrawals
    pub fn deposit_buffered(
        &mut self,
        max_deposits: u64,
        block: u64,
    ) -> CoreResult<DepositAllocation> {
        let reserved = self.queue.unfinalized_ether()?;
        let depositable = self.buffered_ether.saturating_sub(reserved);
        let affordable = safe_div_u128(depositable, self.config.deposit_size)?;
        let count = u64::try_from(affordable).unwrap_or(u64::MAX).min(max_deposits);

        let allocation = deposit_allocation(&self.registry.snapshot(), count)?;
        let moved = safe_mul_u128(u128::from(allocation.allocated), self.config.deposit_size)?;

        let mut registry = self.registry.clone();
        for (id, deposits) in allocation.module_ids.iter().zip(&allocation.deposits) {
            if *deposits > 0 {
                registry.record_deposits(*id, *deposits, block)?;
            }
        }
        let buffered = safe_sub_u128(self.buffered_ether, moved)?;
        let staked = safe_add_u128(self.staked_ether, moved)?;

        self.registry = registry;
        self.buffered_ether = buffered;
        self.staked_ether = staked;

        info!("Deposited {} validators ({} ether) at block {}", allocation.allocated, moved, block);
        Ok(allocation)
    }

    /// Apply an oracle report: rebase within the limiter budget, finalize
    /// withdrawals into `escrow` and mint fee shares.
    ///
    /// The report is planned against a copy of the pool totals. Only the
    /// registry is cloned, and only when the report carries key updates, so
    /// the cost does not grow with the balances or the request history.
    pub fn handle_report<E: Escrow + ?Sized>(
        &mut self,
        report: &OracleReport,
        escrow: &mut E,
    ) -> CoreResult<ReportOutcome> {
        if let Some(last_block) = self.last_report_block {
            if report.ref_block <= last_block {
                return Err(StakingCoreError::StaleReport {
                    ref_block: report.ref_block,
                    last_block,
                });
            }
        }

        let plan = self.plan_report(report, escrow.balance())?;

        if let Some(batch) = &plan.batch {
            if batch.params.ether_to_lock > 0 {
                escrow.fund(batch.params.ether_to_lock)?;
            }
            // Checked while planning against the funded balance
            self.queue.finalize(
                batch.last_id,
                batch.params.ether_to_lock,
                batch.pool_value,
                batch.shares,
                escrow.balance(),
            )?;
        }

        if let Some(registry) = plan.registry {
            self.registry = registry;
        }
        self.set_totals(plan.totals);
        self.balances.extend(plan.credits);
        self.last_report_block = Some(report.ref_block);

        let outcome = plan.outcome;
        info!(
            "Applied report at block {}: pool {} ether, {} shares, limiter {}/{}",
            outcome.ref_block,
            outcome.pool_value,
            outcome.total_shares,
            outcome.limiter_used,
            outcome.limiter_max
        );
        Ok(outcome)
    }

    fn plan_report(&self, report: &OracleReport, escrow_balance: u128) -> CoreResult<ReportPlan> {
        let registry = if report.module_keys.is_empty() {
            None
        } else {
            let mut registry = self.registry.clone();
            for update in &report.module_keys {
                let available = registry.get(update.module_id)?.available_keys;
                registry.update_keys(update.module_id, update.active_keys, available)?;
            }
            Some(registry)
        };
        let modules = registry.as_ref().unwrap_or(&self.registry).snapshot();

        let mut totals = self.totals();
        let mut limiter = LimiterState::init(
            self.config.max_positive_rebase,
            U256::from(totals.pool_value()),
            U256::from(totals.total_shares),
        )?;

        // Consensus balance is a reported fact and always applied in full
        if report.consensus_balance_delta != 0 {
            limiter.apply_consensus_delta(report.consensus_balance_delta)?;
        }
        totals.staked_ether =
            safe_apply_delta_u128(totals.staked_ether, report.consensus_balance_delta)?;

        let rewards_applied = if report.execution_rewards > 0 {
            to_u128(limiter.append_ether(U256::from(report.execution_rewards))?)?
        } else {
            0
        };
        totals.buffered_ether = safe_add_u128(totals.buffered_ether, rewards_applied)?;

        let batch = match report.finalize_up_to {
            Some(last_id) => Some(self.plan_finalization(&mut totals, last_id, escrow_balance)?),
            None => None,
        };

        let mut shares_burned = 0;
        if totals.pending_burn_shares > 0 {
            shares_burned =
                to_u128(limiter.deduct_shares(U256::from(totals.pending_burn_shares))?)?;
            totals.pending_burn_shares = safe_sub_u128(totals.pending_burn_shares, shares_burned)?;
            totals.total_shares = safe_sub_u128(totals.total_shares, shares_burned)?;
            if totals.pending_burn_shares > 0 {
                warn!("Deferred burn of {} withdrawal shares", totals.pending_burn_shares);
            }
        }

        let fee_mint = self.plan_fees(
            &modules,
            &totals,
            report.consensus_balance_delta,
            rewards_applied,
        )?;
        let credits = self.fee_credits(&fee_mint)?;
        totals.total_shares = safe_add_u128(totals.total_shares, fee_mint.total_shares)?;

        let outcome = ReportOutcome {
            ref_block: report.ref_block,
            consensus_delta: report.consensus_balance_delta,
            execution_rewards_applied: rewards_applied,
            execution_rewards_deferred: report.execution_rewards - rewards_applied,
            finalization: batch.as_ref().map(|batch| batch.params),
            shares_burned,
            pending_burn_shares: totals.pending_burn_shares,
            fee_mint,
            limiter_used: limiter.used_limit(),
            limiter_max: limiter.max_limit(),
            pool_value: totals.pool_value(),
            total_shares: totals.total_shares,
        };

        Ok(ReportPlan {
            registry,
            totals,
            batch,
            credits,
            outcome,
        })
    }

    /// Lock buffered ether for requests up to `last_id` and burn the shares
    /// worth exactly that ether. The discount part joins the pending burn.
    fn plan_finalization(
        &self,
        totals: &mut Totals,
        last_id: u64,
        escrow_balance: u128,
    ) -> CoreResult<FinalizationBatch> {
        let pool_value = totals.pool_value();
        let shares = totals.total_shares;
        let params = self.queue.calculate_finalization_params(last_id, pool_value, shares)?;

        if params.ether_to_lock > totals.buffered_ether {
            return Err(StakingCoreError::InsufficientBuffer {
                required: params.ether_to_lock,
                buffered: totals.buffered_ether,
            });
        }

        let rate = ExchangeRate::from_u128(pool_value, shares)?;
        let neutral_burn = to_u128(rate.shares_for_value(U256::from(params.ether_to_lock))?)?
            .min(params.shares_to_burn);
        let discount = safe_sub_u128(params.shares_to_burn, neutral_burn)?;

        let funded_balance = safe_add_u128(escrow_balance, params.ether_to_lock)?;
        self.queue
            .check_finalize(last_id, params.ether_to_lock, pool_value, shares, funded_balance)?;

        totals.buffered_ether = safe_sub_u128(totals.buffered_ether, params.ether_to_lock)?;
        totals.queued_shares = safe_sub_u128(totals.queued_shares, params.shares_to_burn)?;
        totals.total_shares = safe_sub_u128(totals.total_shares, neutral_burn)?;
        totals.pending_burn_shares = safe_add_u128(totals.pending_burn_shares, discount)?;

        debug!(
            "Finalization burns {} shares, {} shares discount pending",
            neutral_burn, discount
        );
        Ok(FinalizationBatch {
            last_id,
            params,
            pool_value,
            shares,
        })
    }

    /// Fee shares on the report's net positive rewards
    fn plan_fees(
        &self,
        modules: &[ModuleRecord],
        totals: &Totals,
        consensus_delta: i128,
        rewards_applied: u128,
    ) -> CoreResult<FeeMint> {
        let applied =
            i128::try_from(rewards_applied).map_err(|_| StakingCoreError::ConversionError)?;
        let net = consensus_delta
            .checked_add(applied)
            .ok_or(StakingCoreError::MathOverflow)?;
        if net <= 0 {
            return Ok(FeeMint::default());
        }

        let distribution = distribute(modules)?;
        let mint = FeeMint::compute(
            net.unsigned_abs(),
            &distribution,
            totals.pool_value(),
            totals.total_shares,
        )?;
        if mint.total_shares > 0 {
            debug!(
                "Minting {} fee shares ({} to treasury)",
                mint.total_shares, mint.treasury_shares
            );
        }
        Ok(mint)
    }

    /// New balances of every fee recipient. A recipient may appear more
    /// than once, e.g. as module and treasury.
    fn fee_credits(&self, mint: &FeeMint) -> CoreResult<BTreeMap<Address, u128>> {
        let mut credits = BTreeMap::new();
        let recipients = mint
            .module_shares
            .iter()
            .map(|(_, recipient, shares)| (*recipient, *shares))
            .chain(std::iter::once((self.config.treasury, mint.treasury_shares)));

        for (account, shares) in recipients {
            if shares == 0 {
                continue;
            }
            let balance = match credits.get(&account) {
                Some(balance) => *balance,
                None => self.shares_of(&account),
            };
            credits.insert(account, safe_add_u128(balance, shares)?);
        }
        Ok(credits)
    }

    fn totals(&self) -> Totals {
        Totals {
            buffered_ether: self.buffered_ether,
            staked_ether: self.staked_ether,
            total_shares: self.total_shares,
            queued_shares: self.queued_shares,
            pending_burn_shares: self.pending_burn_shares,
        }
    }

    fn set_totals(&mut self, totals: Totals) {
        self.buffered_ether = totals.buffered_ether;
        self.staked_ether = totals.staked_ether;
        self.total_shares = totals.total_shares;
        self.queued_shares = totals.queued_shares;
        self.pending_burn_shares = totals.pending_burn_shares;
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config: self.config.clone(),
            buffered_ether: self.buffered_ether,
            staked_ether: self.staked_ether,
            total_shares: self.total_shares,
            queued_shares: self.queued_shares,
            pending_burn_shares: self.pending_burn_shares,
            balances: self.balances.clone(),
            queue: self.queue.clone(),
            modules: self.registry.snapshot().to_vec(),
            last_report_block: self.last_report_block,
        }
    }

    /// Restore a pool, rejecting unknown schema versions and share ledgers
    /// that do not add up to the recorded supply
    pub fn from_snapshot(snapshot: PoolSnapshot) -> CoreResult<Self> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(StakingCoreError::UnsupportedSchema(snapshot.schema_version));
        }
        snapshot.config.validate()?;

        let held = snapshot
            .balances
            .values()
            .try_fold(0u128, |acc, shares| safe_add_u128(acc, *shares))?;
        let accounted = safe_add_u128(
            held,
            safe_add_u128(snapshot.queued_shares, snapshot.pending_burn_shares)?,
        )?;
        if accounted != snapshot.total_shares {
            return Err(StakingCoreError::invalid_config(
                "total_shares",
                snapshot.total_shares,
                "sum of balances, queued and pending burn shares",
            ));
        }

        Ok(Self {
            registry: ModuleRegistry::from_records(snapshot.config.max_modules, snapshot.modules)?,
            config: snapshot.config,
            buffered_ether: snapshot.buffered_ether,
            staked_ether: snapshot.staked_ether,
            total_shares: snapshot.total_shares,
            queued_shares: snapshot.queued_shares,
            pending_burn_shares: snapshot.pending_burn_shares,
            balances: snapshot.balances,
            queue: snapshot.queue,
            last_report_block: snapshot.last_report_block,
        })
    }
}
