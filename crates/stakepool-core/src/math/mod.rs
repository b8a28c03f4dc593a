//! # Mathematical Functions
//!
//! Checked integer arithmetic and 256-bit mul-div used by every component.

pub mod big_int;
pub mod safe_math;

// Re-export commonly used functions
pub use big_int::*;
pub use safe_math::*;
