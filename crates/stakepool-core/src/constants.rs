//! # Protocol Constants
//!
//! Fixed-point bases and policy defaults for the accounting core:
//! - Precision bases (limiter, basis points, fee points, price ratio)
//! - Withdrawal queue bounds
//! - Registry and deposit defaults

// ============================================================================
// Precision Bases
// ============================================================================

/// Rebase limiter fixed-point base (1e9 = 100%)
pub const LIMITER_PRECISION_BASE: u64 = 1_000_000_000;

/// Basis points denominator (10,000 = 100%)
pub const TOTAL_BASIS_POINTS: u128 = 10_000;

/// Precision of fee shares returned by the reward distributor (1e20 = 100%)
pub const FEE_PRECISION_POINTS: u128 = 100_000_000_000_000_000_000;

/// Scale of the integer price ratio used to collapse finalization batches
pub const E27_PRECISION_BASE: u128 = 1_000_000_000_000_000_000_000_000_000;

/// One ether in wei
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

// ============================================================================
// Rebase Policy Defaults
// ============================================================================

/// Default per-report positive rebase cap (0.075%)
pub const DEFAULT_MAX_POSITIVE_REBASE: u64 = 750_000;

// ============================================================================
// Withdrawal Queue Defaults
// ============================================================================

/// Requests must carry strictly more ether than this
pub const DEFAULT_MIN_WITHDRAWAL: u128 = 100;

/// Largest single withdrawal request (1000 ether)
pub const DEFAULT_MAX_WITHDRAWAL: u128 = 1_000 * ONE_ETHER;

// ============================================================================
// Registry and Deposit Defaults
// ============================================================================

/// Default bound on registered staking modules
pub const DEFAULT_MAX_MODULES: usize = 32;

/// Ether carried by one validator deposit
pub const DEFAULT_DEPOSIT_SIZE: u128 = 32 * ONE_ETHER;

// ============================================================================
// Persistence
// ============================================================================

/// Current `PoolSnapshot` schema version
pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;
