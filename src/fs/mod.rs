//! File system operations module
//!
//! Provides glob-filtered file discovery, the cross-platform metadata
//! model, and the streaming copy and removal helpers used by the
//! transfer engine.

mod finder;
mod metadata;
mod operations;

pub use finder::*;
pub use metadata::*;
pub use operations::*;

pub(crate) use finder::is_hidden;
pub(crate) use operations::discard_partial;
