//! netplane CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// netplane - network policy and IPAM for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "netplane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move netplane state to a Kubernetes datastore
    #[command(subcommand)]
    Migrate(commands::migrate::MigrateCommand),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Migrate(cmd) => commands::migrate::run(cmd).await,
        }
    }
}
