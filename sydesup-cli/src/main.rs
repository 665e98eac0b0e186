//! SYDE SUP CLI - create and unpack service update packages.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use sydesup::config::SupConfig;
use sydesup::logging::init_logging;

use commands::{CreateArgs, UnpackArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "sydesup", version, about = "Service update package tool")]
struct Cli {
    /// Config file (default: <config dir>/sydesup/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "sydesup=trace" (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a package from a project view
    Create(CreateArgs),
    /// Unpack and validate a package
    Unpack(UnpackArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<SupConfig, CliError> {
    let config = match path {
        Some(path) => SupConfig::load(path),
        None => SupConfig::load_default(),
    };
    config.map_err(|e| CliError::Config(e.to_string()))
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_ref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let _guard = init_logging(level, config.log_file.as_deref())
        .map_err(|e| CliError::Logging(e.to_string()))?;

    match cli.command {
        Commands::Create(args) => commands::create::run(args, &config),
        Commands::Unpack(args) => commands::unpack::run(args),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        commands::print_warnings(e.warnings());
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
