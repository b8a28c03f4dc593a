//! # Type Definitions
//!
//! Plain value types crossing the core's boundary.

pub mod address;
pub mod config;
pub mod module;
pub mod report;

pub use address::*;
pub use config::*;
pub use module::*;
pub use report::*;
