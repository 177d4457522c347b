//! Migrate command - move netplane state into a Kubernetes datastore
//!
//! Typical flow:
//!
//! ```text
//! netplane migrate lock   -c source.cfg
//! netplane migrate export -c source.cfg -o bundle.yaml
//! netplane migrate import -c dest.cfg   -f bundle.yaml
//! # switch the cluster over to the destination, then
//! netplane migrate unlock -c dest.cfg
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use tracing::{info, warn};

use netplane_common::config::DatastoreConfig;
use netplane_common::PRODUCT_VERSION;
use netplane_migrate::{check_destination, BundleSource, Exporter, Importer, LockManager};

use super::connect;
use crate::{Error, Result};

/// Migrate subcommands
#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Lock the datastore for migration
    Lock(ConfigArgs),

    /// Release the migration lock
    Unlock(ConfigArgs),

    /// Import a migration bundle into an empty Kubernetes datastore
    Import(ImportArgs),

    /// Export the datastore as a migration bundle
    Export(ExportArgs),
}

/// Datastore selection shared by every subcommand
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Datastore config file (default: /etc/netplane/netplane.cfg)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<DatastoreConfig> {
        Ok(DatastoreConfig::load(self.config.as_deref())?)
    }
}

/// Import arguments
#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Bundle produced by `netplane migrate export`, or `-` for stdin
    #[arg(long, short = 'f')]
    pub filename: String,
}

/// Export arguments
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write the bundle here instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Run a migrate subcommand
pub async fn run(cmd: MigrateCommand) -> Result<()> {
    let mut out = std::io::stdout();
    match cmd {
        MigrateCommand::Lock(args) => {
            let store = connect(&args.load()?).await?;
            LockManager::new(&store, PRODUCT_VERSION).lock(&mut out).await?;
        }
        MigrateCommand::Unlock(args) => {
            let store = connect(&args.load()?).await?;
            LockManager::new(&store, PRODUCT_VERSION)
                .unlock(&mut out)
                .await?;
        }
        MigrateCommand::Import(args) => {
            let config = args.config.load()?;
            check_destination(&config)?;
            let store = connect(&config).await?;
            let source = BundleSource::from_arg(&args.filename);
            let report = Importer::new(&store, &config, PRODUCT_VERSION)
                .run(&source, &mut out)
                .await?;
            info!(
                crds_created = report.schema.created,
                crds_updated = report.schema.updated,
                resources = report.resources.num_handled,
                ipam = report.ipam.num_handled,
                "import complete"
            );
        }
        MigrateCommand::Export(args) => {
            let store = connect(&args.config.load()?).await?;
            if !LockManager::new(&store, PRODUCT_VERSION).check_locked().await? {
                warn!("datastore is not locked; run 'netplane migrate lock' first for a consistent export");
            }
            let bundle = Exporter::new(&store).export().await?.to_bytes();
            match args.output {
                Some(path) => write_bundle(&path, &bundle).await?,
                None => {
                    out.write_all(&bundle)?;
                    out.flush()?;
                }
            }
        }
    }
    Ok(())
}

async fn write_bundle(path: &Path, bundle: &[u8]) -> Result<()> {
    tokio::fs::write(path, bundle)
        .await
        .map_err(|e| Error::command_failed(format!("failed to write {}: {}", path.display(), e)))?;
    info!(path = %path.display(), bytes = bundle.len(), "wrote migration bundle");
    Ok(())
}
