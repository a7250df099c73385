//! Configuration module for filekit
//!
//! Provides the CLI arguments, JSON-loadable transfer settings
//! and size parsing.

mod settings;

pub use settings::*;
