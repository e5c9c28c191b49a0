//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::kinds::KindName;

/// xprovider - Reconciles declarative resources against a remote API.
#[derive(Parser, Debug)]
#[command(name = "xprovider")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "XPROVIDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the provider configuration and, optionally, a manifest file.
    Validate {
        /// Manifest file to check as well.
        file: Option<PathBuf>,
    },

    /// Store the resources declared in a manifest file, then reconcile them.
    Apply {
        /// Manifest file (one or more YAML documents).
        file: PathBuf,

        /// Store the resources without reconciling them.
        #[arg(long)]
        no_reconcile: bool,
    },

    /// Run one reconciliation pass for a resource.
    Reconcile {
        /// Resource kind.
        kind: KindName,

        /// Resource name.
        name: String,
    },

    /// Mark a resource for deletion and run one reconciliation pass.
    Delete {
        /// Resource kind.
        kind: KindName,

        /// Resource name.
        name: String,
    },

    /// Show a stored resource.
    Get {
        /// Resource kind.
        kind: KindName,

        /// Resource name.
        name: String,
    },

    /// Show the status of every stored resource.
    Status {
        /// Only show resources of this kind.
        #[arg(short, long)]
        kind: Option<KindName>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
