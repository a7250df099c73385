//! Transfer orchestration
//!
//! Provides the copy/move engine and the destination claims that keep
//! concurrent writers apart.

mod claims;
mod transfer;

pub use claims::*;
pub use transfer::*;
