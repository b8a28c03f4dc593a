use std::path::Path;

use serde::{Deserialize, Serialize};
use stakepool_core::{
    AccessControl, CoreResult, Escrow, InMemoryEscrow, PoolSnapshot, Role, SharedPool, StakingPool,
};
use tokio::fs;

use crate::config::KeeperConfig;
use crate::error::{KeeperError, KeeperResult};
use crate::events::{parse_journal, PoolEvent};

/// Everything the keeper persists between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperState {
    pub pool: PoolSnapshot,
    pub escrow: InMemoryEscrow,
    /// Journal events already replayed, successful or not
    pub events_applied: u64,
}

/// Outcome of one journal pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub failed: usize,
}

/// Replays journal events through a shared pool and persists its state
pub struct Keeper {
    /// Keeper configuration
    config: KeeperConfig,

    /// Pool and escrow behind the single-writer lock
    pool: SharedPool<InMemoryEscrow>,

    /// Events of the journal already consumed
    events_applied: u64,

    /// Dry run mode flag
    dry_run: bool,
}

impl Keeper {
    /// Resume from the snapshot file if present, else start a fresh pool
    pub async fn new(config: KeeperConfig, dry_run: bool) -> KeeperResult<Self> {
        let access = Self::access_control(&config)?;

        let (pool, events_applied) = if Path::new(&config.snapshot_path).exists() {
            let content = fs::read_to_string(&config.snapshot_path).await?;
            let state: KeeperState = serde_json::from_str(&content)?;
            if state.pool.config != config.pool {
                log::warn!(
                    "Snapshot pool policy differs from configuration, keeping snapshot policy"
                );
            }
            log::info!(
                "Resuming from {} after {} journal events",
                config.snapshot_path,
                state.events_applied
            );
            let pool = StakingPool::from_snapshot(state.pool)?;
            (SharedPool::new(pool, state.escrow, access), state.events_applied)
        } else {
            log::info!("No snapshot at {}, starting a fresh pool", config.snapshot_path);
            (SharedPool::new(Self::fresh_pool(&config)?, InMemoryEscrow::new(), access), 0)
        };

        Ok(Self {
            config,
            pool,
            events_applied,
            dry_run,
        })
    }

    pub fn pool(&self) -> &SharedPool<InMemoryEscrow> {
        &self.pool
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    /// Apply journal events appended since the last pass
    pub async fn process_journal(&mut self) -> KeeperResult<ReplaySummary> {
        if !Path::new(&self.config.journal_path).exists() {
            log::debug!("Journal {} does not exist yet", self.config.journal_path);
            return Ok(ReplaySummary::default());
        }

        let content = fs::read_to_string(&self.config.journal_path).await?;
        let events = parse_journal(&content, self.events_applied)?;

        let mut summary = ReplaySummary::default();
        for (line, event) in events {
            match self.apply_event(&event) {
                Ok(()) => summary.applied += 1,
                Err(e) if e.is_recoverable() => {
                    log::warn!("Journal line {} ({}) rejected: {}", line, event.label(), e);
                    summary.failed += 1;
                }
                Err(e) => {
                    log::error!(
                        "Journal line {} ({}) failed: {} [{:?}]",
                        line,
                        event.label(),
                        e,
                        e.kind()
                    );
                    summary.failed += 1;
                }
            }
            self.events_applied += 1;
        }

        if summary.applied + summary.failed > 0 {
            if self.dry_run {
                log::info!("Dry run: not persisting snapshot");
            } else {
                self.persist().await?;
            }
        }

        Ok(summary)
    }

    /// Write the snapshot, replacing the previous one atomically
    pub async fn persist(&self) -> KeeperResult<()> {
        let state = KeeperState {
            pool: self.pool.snapshot()?,
            escrow: self.pool.inspect_escrow(|escrow| escrow.clone())?,
            events_applied: self.events_applied,
        };
        let content = serde_json::to_string_pretty(&state)?;

        let tmp_path = format!("{}.tmp", self.config.snapshot_path);
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.config.snapshot_path).await?;

        log::debug!("Persisted snapshot after {} events", self.events_applied);
        Ok(())
    }

    /// Escrow must cover every finalized, unclaimed request
    pub fn health_check(&self) -> KeeperResult<()> {
        let view = self.pool.view()?;
        let balance = self.pool.inspect_escrow(|escrow| escrow.balance())?;
        if balance < view.total_locked {
            return Err(KeeperError::EscrowShortfall {
                balance,
                locked: view.total_locked,
            });
        }

        log::debug!(
            "Health check passed - pool {} ether, {} shares, {} locked",
            view.pool_value,
            view.total_shares,
            view.total_locked
        );
        Ok(())
    }

    fn apply_event(&self, event: &PoolEvent) -> CoreResult<()> {
        match event {
            PoolEvent::Submit { sender, amount } => {
                let shares = self.pool.submit(*sender, *amount)?;
                log::debug!("{} submitted {} for {} shares", sender, amount, shares);
            }
            PoolEvent::RequestWithdrawal { owner, shares, block } => {
                let id = self.pool.request_withdrawal(*owner, *shares, *block)?;
                log::info!("Withdrawal request {} queued for {}", id, owner);
            }
            PoolEvent::Claim { request_id, hint } => {
                let receipt = self.pool.claim(*request_id, *hint)?;
                log::info!(
                    "Withdrawal {} paid {} to {}",
                    receipt.request_id,
                    receipt.amount,
                    receipt.recipient
                );
            }
            PoolEvent::Deposit { caller, max_deposits, block } => {
                let permit = self.pool.permit(*caller, Role::Depositor)?;
                let allocation = self.pool.deposit_buffered(&permit, *max_deposits, *block)?;
                log::info!("Deposited {} validators", allocation.allocated);
            }
            PoolEvent::Report { caller, report } => {
                let permit = self.pool.permit(*caller, Role::Oracle)?;
                let outcome = self.pool.handle_report(&permit, report)?;
                if outcome.execution_rewards_deferred > 0 {
                    log::warn!(
                        "Report {} deferred {} execution rewards",
                        outcome.ref_block,
                        outcome.execution_rewards_deferred
                    );
                }
            }
            PoolEvent::AddModule { caller, module } => {
                let permit = self.pool.permit(*caller, Role::ModuleManager)?;
                self.pool.add_module(&permit, module.clone())?;
            }
            PoolEvent::SetModuleStatus { caller, module_id, status } => {
                let permit = self.pool.permit(*caller, Role::ModuleManager)?;
                self.pool.set_module_status(&permit, *module_id, *status)?;
            }
            PoolEvent::UpdateModuleFees {
                caller,
                module_id,
                fee_bps,
                treasury_fee_bps,
            } => {
                let permit = self.pool.permit(*caller, Role::ModuleManager)?;
                self.pool
                    .update_module_fees(&permit, *module_id, *fee_bps, *treasury_fee_bps)?;
            }
            PoolEvent::UpdateModuleKeys {
                caller,
                module_id,
                active_keys,
                available_keys,
            } => {
                let permit = self.pool.permit(*caller, Role::ModuleManager)?;
                self.pool
                    .update_module_keys(&permit, *module_id, *active_keys, *available_keys)?;
                log::info!("Module {} now has {} keys available", module_id, available_keys);
            }
            PoolEvent::UpdateTargetShare {
                caller,
                module_id,
                target_share_bps,
            } => {
                let permit = self.pool.permit(*caller, Role::ModuleManager)?;
                self.pool
                    .update_module_target_share(&permit, *module_id, *target_share_bps)?;
            }
        }
        Ok(())
    }

    fn fresh_pool(config: &KeeperConfig) -> KeeperResult<StakingPool> {
        let mut pool = StakingPool::new(config.pool.clone())?;
        for module in &config.modules {
            pool.registry_mut().add_module(module.to_record())?;
        }
        Ok(pool)
    }

    fn access_control(config: &KeeperConfig) -> KeeperResult<AccessControl> {
        let mut access = AccessControl::new(config.admin);
        let admin = access.permit(config.admin, Role::Admin)?;
        for grant in &config.roles {
            access.grant(&admin, grant.address, grant.role)?;
        }
        Ok(access)
    }
}
