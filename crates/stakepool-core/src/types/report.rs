//! # Oracle Report Types
//!
//! The narrow, already consensus-validated report the oracle delivers once
//! per reporting cycle.

use crate::types::ModuleId;

/// New active key count for one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleKeyUpdate {
    pub module_id: ModuleId,
    pub active_keys: u64,
}

/// Periodic accounting report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub struct OracleReport {
    /// Block the report was taken at
    pub ref_block: u64,
    /// Change of the consensus-layer balance since the previous report
    pub consensus_balance_delta: i128,
    /// Execution-layer rewards waiting to be pulled into the pool
    pub execution_rewards: u128,
    /// Finalize withdrawal requests up to and including this id
    #[cfg_attr(feature = "client", serde(default))]
    pub finalize_up_to: Option<u64>,
    /// Per-module active key counts
    #[cfg_attr(feature = "client", serde(default))]
    pub module_keys: Vec<ModuleKeyUpdate>,
}
