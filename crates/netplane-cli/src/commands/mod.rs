//! CLI commands

use tracing::debug;

use netplane_common::config::{DatastoreConfig, DatastoreType};
use netplane_common::kube_utils::create_client;
use netplane_migrate::KubeDatastore;

use crate::{Error, Result};

pub mod migrate;

/// Connect to the datastore a config describes.
///
/// Only Kubernetes datastores are reachable from this tool.
pub async fn connect(config: &DatastoreConfig) -> Result<KubeDatastore> {
    match config.spec.datastore_type {
        DatastoreType::Kubernetes => {
            let client = create_client(config.spec.kubeconfig.as_deref()).await?;
            debug!("connected to kubernetes datastore");
            Ok(KubeDatastore::new(client))
        }
        other => Err(Error::UnsupportedDatastore(other)),
    }
}
