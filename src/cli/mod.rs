//! CLI module for the xprovider tool.
//!
//! This module provides the command-line interface for storing and
//! reconciling managed resources.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::{OutputFormatter, ResourceSummary};
