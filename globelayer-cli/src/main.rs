//! GlobeLayer CLI
//!
//! Drives a tile pyramid headlessly and manages its configuration and
//! on-disk tile store.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::fly::FlyArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "globelayer", version, about = "Adaptive tile pyramid streaming for globe imagery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Simulate a descending camera and stream the configured layer
    Fly(FlyArgs),

    /// Manage the on-disk tile store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Fly(args) => commands::fly::run(args),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
