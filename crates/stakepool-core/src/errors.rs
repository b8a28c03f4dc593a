//! # Core Error Types
//!
//! Every fallible operation in the accounting core returns [`CoreResult`].
//! Errors carry the offending id or amount so callers can remediate precisely,
//! and each variant maps onto one [`ErrorKind`] of the failure taxonomy.

use thiserror::Error;

/// Failure taxonomy shared by all components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad policy parameters; fatal at setup, never retried
    Config,
    /// A caller bug (dirty state reused, index out of range, division by zero)
    InvariantViolation,
    /// Escrow or capacity too low; retry later with updated inputs
    InsufficientResource,
    /// The operation was already performed; safe to ignore
    AlreadyDone,
}

/// Core accounting errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize))]
pub enum StakingCoreError {
    // ========================================================================
    // Math Errors
    // ========================================================================

    #[error("Math overflow")]
    MathOverflow,

    #[error("Math underflow")]
    MathUnderflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Mul div overflow")]
    MulDivOverflow,

    #[error("Conversion error")]
    ConversionError,

    #[error("Exchange rate with zero shares backing {pooled_value} pooled value")]
    ZeroShares { pooled_value: String },

    // ========================================================================
    // Configuration Errors
    // ========================================================================

    #[error("Invalid configuration for '{parameter}': got {value}, expected {expected}")]
    InvalidConfig {
        parameter: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedSchema(u16),

    // ========================================================================
    // Rebase Limiter Errors
    // ========================================================================

    #[error("Limiter state already consumed ({used_limit} of {max_limit} used)")]
    DirtyState { used_limit: u64, max_limit: u64 },

    #[error("Report for block {ref_block} is not newer than last report at {last_block}")]
    StaleReport { ref_block: u64, last_block: u64 },

    // ========================================================================
    // Withdrawal Queue Errors
    // ========================================================================

    #[error("Withdrawal amount {amount} does not exceed minimum {minimum}")]
    BelowMinimum { amount: u128, minimum: u128 },

    #[error("Withdrawal amount {amount} exceeds maximum {maximum}")]
    AboveMaximum { amount: u128, maximum: u128 },

    #[error("Bad finalization range: last id {last_id}, finalized {finalized}, length {length}")]
    InvalidRange { last_id: u64, finalized: u64, length: u64 },

    #[error("Insufficient escrow: need {required}, available {available}")]
    InsufficientEscrow { required: u128, available: u128 },

    #[error("Insufficient buffered ether: need {required}, buffered {buffered}")]
    InsufficientBuffer { required: u128, buffered: u128 },

    #[error("Insufficient shares: need {required}, held {available}")]
    InsufficientShares { required: u128, available: u128 },

    #[error("Request {0} is not finalized")]
    NotFinalized(u64),

    #[error("Request {0} is already claimed")]
    AlreadyClaimed(u64),

    #[error("Request {0} does not exist")]
    UnknownRequest(u64),

    #[error("No finalization price covers request {0}")]
    PriceNotFound(u64),

    #[error("Payout of {amount} for request {request_id} rejected: {reason}")]
    TransferFailed {
        request_id: u64,
        amount: u128,
        reason: String,
    },

    // ========================================================================
    // Reward and Allocation Errors
    // ========================================================================

    #[error("Total fee {total_fee} reaches precision base {precision}")]
    FeeExceedsTotal { total_fee: u128, precision: u128 },

    #[error("Length mismatch: {0} counts vs {1} capacities")]
    LengthMismatch(usize, usize),

    // ========================================================================
    // Registry Errors
    // ========================================================================

    #[error("Too many modules: {0} (max {1})")]
    TooManyModules(usize, usize),

    #[error("Module {0} not found")]
    UnknownModule(u32),

    #[error("Module {0} already registered")]
    DuplicateModule(u32),

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    #[error("Unauthorized: {caller} lacks role {role}")]
    Unauthorized { caller: String, role: String },

    #[error("{0} lock poisoned")]
    LockPoisoned(String),
}

/// Result type using core errors
pub type CoreResult<T> = Result<T, StakingCoreError>;

impl StakingCoreError {
    /// Create an invalid configuration error
    pub fn invalid_config(
        parameter: &'static str,
        value: impl ToString,
        expected: &'static str,
    ) -> Self {
        Self::InvalidConfig {
            parameter,
            value: value.to_string(),
            expected,
        }
    }

    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        use StakingCoreError::*;
        match self {
            InvalidConfig { .. } | UnsupportedSchema(_) => ErrorKind::Config,
            InsufficientEscrow { .. }
            | InsufficientBuffer { .. }
            | InsufficientShares { .. }
            | TransferFailed { .. }
            | TooManyModules(..)
            | BelowMinimum { .. }
            | AboveMaximum { .. } => ErrorKind::InsufficientResource,
            AlreadyClaimed(_) | DuplicateModule(_) | StaleReport { .. } => ErrorKind::AlreadyDone,
            MathOverflow
            | MathUnderflow
            | DivisionByZero
            | MulDivOverflow
            | ConversionError
            | ZeroShares { .. }
            | DirtyState { .. }
            | InvalidRange { .. }
            | NotFinalized(_)
            | UnknownRequest(_)
            | PriceNotFound(_)
            | FeeExceedsTotal { .. }
            | LengthMismatch(..)
            | UnknownModule(_)
            | Unauthorized { .. }
            | LockPoisoned(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Whether retrying later with fresh inputs can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::InsufficientResource | ErrorKind::AlreadyDone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_values() {
        let err = StakingCoreError::BelowMinimum { amount: 50, minimum: 100 };
        assert_eq!(format!("{}", err), "Withdrawal amount 50 does not exceed minimum 100");

        let err = StakingCoreError::invalid_config("max_positive_rebase", 0, "within (0, 1e9]");
        assert!(format!("{}", err).contains("max_positive_rebase"));
    }

    #[test]
    fn test_taxonomy() {
        assert_eq!(StakingCoreError::AlreadyClaimed(3).kind(), ErrorKind::AlreadyDone);
        assert_eq!(
            StakingCoreError::DirtyState { used_limit: 1, max_limit: 2 }.kind(),
            ErrorKind::InvariantViolation
        );
        assert!(StakingCoreError::InsufficientEscrow {
            required: 2,
            available: 1
        }
        .is_recoverable());
        assert!(!StakingCoreError::DivisionByZero.is_recoverable());
        assert_eq!(
            StakingCoreError::invalid_config("x", 1, "y").kind(),
            ErrorKind::Config
        );
    }
}
