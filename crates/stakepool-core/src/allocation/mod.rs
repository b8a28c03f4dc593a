//! # Allocation
//!
//! Capacity-bounded min-first allocation and the deposit pipeline built on it.

pub mod deposits;
pub mod min_first;

pub use deposits::*;
pub use min_first::allocate;
