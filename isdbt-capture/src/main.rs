//! isdbt-capture: ISDB-T capture tool for Linux DVB v5 adapters.

use clap::Parser;
use colored::Colorize;
use log::{error, info};

mod channels;
mod commands;
mod config;
mod context;
mod logging;
mod player;

use crate::config::{ConfigFile, Settings};
use crate::context::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = config::resolve_config_path(cli.config.clone());
    let file_config = match &config_path {
        Some(path) => config::load_config(path)
            .map_err(|e| format!("Failed to load config file {}: {}", path.display(), e))?,
        None => ConfigFile::default(),
    };
    let settings = Settings::resolve(&file_config, &cli);

    let _log_guard = logging::init_logging(
        settings.log_dir.as_deref(),
        settings.retention_days,
        &settings.log_level,
    )?;
    if let Some(path) = &config_path {
        info!("Loaded config from: {}", path.display());
    }

    match cli.command {
        Commands::Capture(args) => commands::capture::run(args, &settings),
        Commands::Scan(args) => commands::scan::run(args, &settings),
        Commands::Devices => commands::devices::run(),
        Commands::Checksignal(args) => commands::checksignal::run(args, &settings),
    }
}
