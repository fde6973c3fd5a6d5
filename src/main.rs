//! apidex - incremental metadata indexer
//!
//! CLI entry point that dispatches to subcommands.

use apidex::cli::{Cli, Commands};
use apidex::config::{Config, ConfigManager};
use apidex::error::{IndexError, IndexResult};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> IndexResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| IndexError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Using local config: {}", path.display());
    }
    apidex::ui::init_theme();

    match cli.command {
        Commands::Run(args) => apidex::cli::commands::run(args, &config).await,
        Commands::Invalidate(args) => apidex::cli::commands::invalidate(args, &config).await,
        Commands::Status(args) => apidex::cli::commands::status(args, &config).await,
        Commands::List(args) => apidex::cli::commands::list(args, &config).await,
        Commands::Config(args) => {
            apidex::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("apidex=warn"),
        1 => EnvFilter::new("apidex=info"),
        _ => EnvFilter::new("apidex=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
