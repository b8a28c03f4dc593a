//! # Shared Pool
//!
//! Single-writer wrapper for using one pool from many threads. All
//! mutations run under one mutex, so no two of them interleave against the
//! same queue or limiter state; privileged ones first check the caller's
//! [`Permit`]. After every successful write an immutable [`PoolView`] is
//! published, which readers load without touching the writer lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::access::{AccessControl, Permit, Role};
use crate::allocation::DepositAllocation;
use crate::errors::{CoreResult, StakingCoreError};
use crate::escrow::Escrow;
use crate::pool::{PoolSnapshot, ReportOutcome, StakingPool};
use crate::types::{Address, ModuleId, ModuleRecord, ModuleStatus, OracleReport};
use crate::withdrawal::{ClaimReceipt, PriceHistory};

/// Read-only state published after each write
#[derive(Debug, Clone)]
pub struct PoolView {
    pub modules: Arc<[ModuleRecord]>,
    pub prices: PriceHistory,
    pub pool_value: u128,
    pub total_shares: u128,
    pub queue_length: u64,
    pub finalized_count: u64,
    pub total_locked: u128,
    pub last_report_block: Option<u64>,
}

impl PoolView {
    fn of(pool: &StakingPool) -> Self {
        Self {
            modules: pool.registry().snapshot(),
            prices: pool.queue().prices().clone(),
            pool_value: pool.pool_value(),
            total_shares: pool.total_shares(),
            queue_length: pool.queue().len(),
            finalized_count: pool.queue().finalized_count(),
            total_locked: pool.queue().total_locked(),
            last_report_block: pool.last_report_block(),
        }
    }
}

struct Ledger<E> {
    pool: StakingPool,
    escrow: E,
}

/// Pool and escrow behind one writer lock
pub struct SharedPool<E: Escrow> {
    ledger: Mutex<Ledger<E>>,
    access: RwLock<AccessControl>,
    view: RwLock<Arc<PoolView>>,
}

impl<E: Escrow> SharedPool<E> {
    pub fn new(pool: StakingPool, escrow: E, access: AccessControl) -> Self {
        let view = Arc::new(PoolView::of(&pool));
        Self {
            ledger: Mutex::new(Ledger { pool, escrow }),
            access: RwLock::new(access),
            view: RwLock::new(view),
        }
    }

    /// Latest published state. A view is replaced whole, so one behind a
    /// poisoned lock is still consistent.
    pub fn view(&self) -> CoreResult<Arc<PoolView>> {
        let view = self.view.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&view))
    }

    pub fn snapshot(&self) -> CoreResult<PoolSnapshot> {
        Ok(self.lock()?.pool.snapshot())
    }

    /// Run `f` against the escrow without mutating anything
    pub fn inspect_escrow<R>(&self, f: impl FnOnce(&E) -> R) -> CoreResult<R> {
        Ok(f(&self.lock()?.escrow))
    }

    // ========================================================================
    // Access Control
    // ========================================================================

    pub fn permit(&self, account: Address, role: Role) -> CoreResult<Permit> {
        self.access_control()?.permit(account, role)
    }

    pub fn grant(&self, admin: &Permit, account: Address, role: Role) -> CoreResult<()> {
        self.access
            .write()
            .map_err(|_| StakingCoreError::LockPoisoned("access control".into()))?
            .grant(admin, account, role)
    }

    pub fn revoke(&self, admin: &Permit, account: &Address, role: Role) -> CoreResult<()> {
        self.access
            .write()
            .map_err(|_| StakingCoreError::LockPoisoned("access control".into()))?
            .revoke(admin, account, role)
    }

    // ========================================================================
    // Unprivileged Writes
    // ========================================================================

    pub fn submit(&self, sender: Address, amount: u128) -> CoreResult<u128> {
        self.write(|ledger| ledger.pool.submit(sender, amount))
    }

    pub fn request_withdrawal(&self, owner: Address, shares: u128, block: u64) -> CoreResult<u64> {
        self.write(|ledger| ledger.pool.request_withdrawal(owner, shares, block))
    }

    /// Claim always pays the request's recipient, so anyone may trigger it
    pub fn claim(&self, request_id: u64, hint: Option<usize>) -> CoreResult<ClaimReceipt> {
        self.write(|ledger| {
            let Ledger { pool, escrow } = ledger;
            pool.claim(request_id, hint, escrow)
        })
    }

    // ========================================================================
    // Privileged Writes
    // ========================================================================

    pub fn handle_report(
        &self,
        permit: &Permit,
        report: &OracleReport,
    ) -> CoreResult<ReportOutcome> {
        self.authorize(permit, Role::Oracle)?;
        self.write(|ledger| {
            let Ledger { pool, escrow } = ledger;
            pool.handle_report(report, escrow)
        })
    }

    pub fn deposit_buffered(
        &self,
        permit: &Permit,
        max_deposits: u64,
        block: u64,
    ) -> CoreResult<DepositAllocation> {
        self.authorize(permit, Role::Depositor)?;
        self.write(|ledger| ledger.pool.deposit_buffered(max_deposits, block))
    }

    pub fn add_module(&self, permit: &Permit, record: ModuleRecord) -> CoreResult<()> {
        self.authorize(permit, Role::ModuleManager)?;
        self.write(|ledger| ledger.pool.registry_mut().add_module(record))
    }

    pub fn set_module_status(
        &self,
        permit: &Permit,
        id: ModuleId,
        status: ModuleStatus,
    ) -> CoreResult<()> {
        self.authorize(permit, Role::ModuleManager)?;
        self.write(|ledger| ledger.pool.registry_mut().set_status(id, status))
    }

    pub fn update_module_fees(
        &self,
        permit: &Permit,
        id: ModuleId,
        fee_bps: u16,
        treasury_fee_bps: u16,
    ) -> CoreResult<()> {
        self.authorize(permit, Role::ModuleManager)?;
        self.write(|ledger| ledger.pool.registry_mut().update_fees(id, fee_bps, treasury_fee_bps))
    }

    pub fn update_module_keys(
        &self,
        permit: &Permit,
        id: ModuleId,
        active_keys: u64,
        available_keys: u64,
    ) -> CoreResult<()> {
        self.authorize(permit, Role::ModuleManager)?;
        self.write(|ledger| ledger.pool.registry_mut().update_keys(id, active_keys, available_keys))
    }

    pub fn update_module_target_share(
        &self,
        permit: &Permit,
        id: ModuleId,
        target_share_bps: u16,
    ) -> CoreResult<()> {
        self.authorize(permit, Role::ModuleManager)?;
        self.write(|ledger| ledger.pool.registry_mut().update_target_share(id, target_share_bps))
    }

    fn authorize(&self, permit: &Permit, role: Role) -> CoreResult<()> {
        self.access_control()?.verify(permit, role)
    }

    fn access_control(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, AccessControl>> {
        self.access
            .read()
            .map_err(|_| StakingCoreError::LockPoisoned("access control".into()))
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Ledger<E>>> {
        self.ledger
            .lock()
            .map_err(|_| StakingCoreError::LockPoisoned("pool".into()))
    }

    /// Apply one mutation and publish the resulting view
    fn write<R>(&self, f: impl FnOnce(&mut Ledger<E>) -> CoreResult<R>) -> CoreResult<R> {
        let mut ledger = self.lock()?;
        let result = f(&mut ledger)?;
        self.publish(&ledger.pool);
        Ok(result)
    }

    /// Replace the published view. The mutation is already applied, so a
    /// poisoned view lock is taken over rather than reported.
    fn publish(&self, pool: &StakingPool) {
        let view = Arc::new(PoolView::of(pool));
        let mut slot = self.view.write().unwrap_or_else(PoisonError::into_inner);
        *slot = view;
    }
}
