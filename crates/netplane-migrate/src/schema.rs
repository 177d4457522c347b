//! CRD installation on the destination datastore
//!
//! Every CRD-backed kind gets its definition created, or replaced when it
//! already exists. The canonical definition always wins; there is no merge
//! with whatever schema the destination had.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use tracing::{debug, info};

use netplane_common::crd::definition_for;
use netplane_common::kinds::ResourceKind;

use crate::client::DatastoreClient;
use crate::error::MigrateError;

/// A kind and the CRD that stores it
#[derive(Clone, Debug)]
pub struct SchemaDefinition {
    /// Kind served by the CRD
    pub kind: ResourceKind,
    /// Desired definition
    pub crd: CustomResourceDefinition,
}

/// Counts from an installation pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchemaSummary {
    /// Definitions that did not exist before
    pub created: usize,
    /// Existing definitions overwritten
    pub updated: usize,
}

/// Definitions for every CRD-backed kind, in `ResourceKind::ALL` order.
pub fn required_definitions() -> Result<Vec<SchemaDefinition>, MigrateError> {
    let mut defs = Vec::new();
    for kind in ResourceKind::ALL {
        if let Some(crd) = definition_for(*kind)? {
            defs.push(SchemaDefinition { kind: *kind, crd });
        }
    }
    Ok(defs)
}

/// Create or replace each definition.
///
/// Stops at the first definition that can't be written, naming it.
pub async fn install_definitions<C>(
    client: &C,
    defs: &[SchemaDefinition],
) -> Result<SchemaSummary, MigrateError>
where
    C: DatastoreClient + ?Sized,
{
    let mut summary = SchemaSummary::default();

    for def in defs {
        let name = def.crd.name_any();
        match client.create_definition(&def.crd).await {
            Ok(_) => {
                summary.created += 1;
                debug!(crd = %name, "created CRD");
            }
            Err(e) if e.is_already_exists() => {
                let current = client
                    .get_definition(&name)
                    .await
                    .map_err(|source| MigrateError::SchemaFetch {
                        name: name.clone(),
                        source,
                    })?;

                let mut desired = def.crd.clone();
                desired.metadata.resource_version = current.metadata.resource_version;
                client
                    .replace_definition(&desired)
                    .await
                    .map_err(|source| MigrateError::SchemaUpdate {
                        name: name.clone(),
                        source,
                    })?;
                summary.updated += 1;
                debug!(crd = %name, "updated CRD");
            }
            Err(source) => return Err(MigrateError::SchemaCreate { name, source }),
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        "CRDs installed"
    );
    Ok(summary)
}
