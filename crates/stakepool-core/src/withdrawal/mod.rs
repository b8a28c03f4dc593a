//! # Withdrawals
//!
//! Request ledger, batched finalization and price-history lookup.

pub mod price_history;
pub mod queue;
pub mod request;

pub use price_history::*;
pub use queue::*;
pub use request::*;
