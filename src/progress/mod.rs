//! Progress reporting module
//!
//! Provides progress bars for transfers, with throughput and ETA display.

mod reporter;

pub use reporter::*;
