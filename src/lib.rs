//! lsbroot - relocatable LSB build environments
//!
//! Builds third-party libraries and tools from declarative recipes into an
//! isolated prefix, then enforces binary compatibility on everything that
//! was installed: symbol versions are checked against a runtime baseline,
//! binaries are stripped and their library search paths made relative.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Recipes, resolution, environment and lifecycle
//! - [`infra`] - Processes, downloads, archives, filesystem
//! - [`config`] - Constants and defaults
//! - [`error`] - Error types

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
