//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// apidex - incremental package and image metadata indexer
///
/// Resolves configured packages and container images against their
/// upstream registries and publishes a versioned index, refetching only
/// what changed.
#[derive(Parser, Debug)]
#[command(name = "apidex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "APIDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local apidex.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve every entry and publish a new index
    Run(RunArgs),

    /// Force reprocessing on the next run
    Invalidate(InvalidateArgs),

    /// Show index, cache and journal state
    Status(StatusArgs),

    /// List entries of the published index
    List(ListArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Discard the previous manifest before running (cache is kept)
    #[arg(long)]
    pub force: bool,

    /// Purge cached results for entries with this tag (repeatable)
    #[arg(long = "force-tag", value_name = "TAG")]
    pub force_tags: Vec<String>,

    /// Override [run] concurrency
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the invalidate command
#[derive(Parser, Debug)]
#[command(group = clap::ArgGroup::new("target").required(true).multiple(true))]
pub struct InvalidateArgs {
    /// Discard the published manifest
    #[arg(long, group = "target")]
    pub all: bool,

    /// Purge cached results for entries with this tag (repeatable)
    #[arg(long = "tag", value_name = "TAG", group = "target")]
    pub tags: Vec<String>,

    /// Drop the whole content cache
    #[arg(long, group = "target")]
    pub cache: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only entries carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only entries whose last resolution failed
    #[arg(long)]
    pub failed: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for status and list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
