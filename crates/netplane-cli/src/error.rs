//! Error types for the CLI

use netplane_common::config::DatastoreType;
use netplane_migrate::MigrateError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Migrate(#[from] MigrateError),

    #[error(transparent)]
    Config(#[from] netplane_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} datastores are not supported by this command; use a kubernetes datastore")]
    UnsupportedDatastore(DatastoreType),

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}
