//! Path handling
//!
//! Provides:
//! - Dialect detection and translation (Windows, POSIX, Git-Bash, WSL, UNC)
//! - Platform capability queries
//! - Character validation, traversal checks and unique naming

mod capabilities;
mod dialect;
mod safety;

pub use capabilities::*;
pub use dialect::*;
pub use safety::*;
