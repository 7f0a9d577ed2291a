//! CLI tool for managing consistent hash rings.
//!
//! Provides commands for:
//! - Creating and reconstituting rings
//! - Remapping vnodes and retiring pnodes
//! - Attaching per-vnode data
//! - Inspecting ring state and diffing topologies
//!
//! Results print to stdout as JSON; logging goes to stderr.

pub mod commands;
pub mod config;

pub use commands::Command;
pub use config::CliConfig;
