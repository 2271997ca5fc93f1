//! Core logic
//!
//! Recipe definitions, dependency resolution, environment composition and
//! the recipe lifecycle. Process spawning, downloads and filesystem helpers
//! live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`target`] - Target capability set and the LSB Linux target
//! - [`build_env`] - Session environment composition
//! - [`recipe`] - Recipe definitions
//! - [`catalog`] - Built-in and user recipe catalogs
//! - [`patch`] - Line-rewriting patch transforms
//! - [`resolver`] - Dependency resolution
//! - [`lifecycle`] - Per-recipe state machine
//! - [`compat`] - Symbol-version constraints and rpath computation
//! - [`manifest`] - Install manifest
//! - [`config`] - `lsbroot.toml` session configuration
//! - [`session`] - Build sessions
//! - [`doctor`] - Host tool checks

pub mod build_env;
pub mod catalog;
pub mod compat;
pub mod config;
pub mod doctor;
pub mod lifecycle;
pub mod manifest;
pub mod patch;
pub mod recipe;
pub mod resolver;
pub mod session;
pub mod target;
