//! CLI subcommands.

pub mod cache;
pub mod config;
pub mod fly;
