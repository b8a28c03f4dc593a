//! # Stakepool Core - Liquid Staking Accounting
//!
//! Pure, synchronous accounting for a liquid-staking pool. It provides:
//!
//! - A per-report positive rebase limiter
//! - A withdrawal queue with batched finalization and price history
//! - Reward fee distribution over staking modules
//! - Min-first deposit allocation across modules
//! - A report-driven engine and a single-writer shared wrapper
//!
//! Callers own all state; nothing here performs I/O.
//!
//! ## Feature Flags
//!
//! - `client`: Enables standard serialization for off-chain use

pub mod access;
pub mod allocation;
pub mod constants;
pub mod errors;
pub mod escrow;
pub mod exchange_rate;
pub mod limiter;
pub mod math;
pub mod pool;
pub mod registry;
pub mod rewards;
pub mod shared;
pub mod types;
pub mod withdrawal;

// Re-export commonly used items
pub use access::{AccessControl, Permit, Role};
pub use constants::*;
pub use errors::{CoreResult, ErrorKind, StakingCoreError};
pub use escrow::{Escrow, InMemoryEscrow, TransferError};
pub use exchange_rate::ExchangeRate;
pub use limiter::LimiterState;
pub use pool::{PoolSnapshot, ReportOutcome, StakingPool};
pub use registry::ModuleRegistry;
pub use rewards::{distribute, FeeMint, RewardDistribution};
pub use shared::{PoolView, SharedPool};
pub use types::*;
pub use withdrawal::*;
