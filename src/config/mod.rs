//! Configuration and constants
//!
//! - [`defaults`] - Default values, file names and baseline constraints

pub mod defaults;
