//! System resource queries
//!
//! Provides disk usage, volume lookup and the space preflight that gates
//! a transfer.

pub mod disk;

pub use disk::*;
