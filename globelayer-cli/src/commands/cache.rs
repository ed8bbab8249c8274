//! Tile store management CLI commands.

use clap::Subcommand;
use globelayer::config::{format_size, ConfigFile};
use globelayer::store::{clear_store, store_stats};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear the tile store, removing all stored tiles
    Clear,
    /// Show tile store statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction) -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let store_dir = &config.cache.directory;

    match action {
        CacheAction::Clear => {
            println!("Clearing tile store at: {}", store_dir.display());
            let result = clear_store(store_dir).map_err(|e| CliError::CacheClear(e.to_string()))?;
            println!(
                "Deleted {} files, freed {}",
                result.files_deleted,
                format_size(result.bytes_freed)
            );
        }
        CacheAction::Stats => {
            println!("Tile store: {}", store_dir.display());
            let (files, bytes) =
                store_stats(store_dir).map_err(|e| CliError::CacheStats(e.to_string()))?;
            println!("  Files: {}", files);
            println!("  Size:  {}", format_size(bytes));
            println!("  Memory budget: {}", format_size(config.cache.memory_size));
        }
    }
    Ok(())
}
