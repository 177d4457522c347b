//! Import orchestrator
//!
//! Drives a bundle into an empty Kubernetes datastore. The steps run in a
//! fixed order and each one is gated on the previous; see the crate docs
//! for the pipeline. Every failure carries the `Stage` it came from.

use std::io::Write;

use tracing::{debug, info};

use netplane_common::config::{DatastoreConfig, DatastoreType};
use netplane_common::crd::ClusterInformationSpec;
use netplane_common::kinds::ResourceKind;
use netplane_common::yaml::parse_yaml;

use crate::apply::{
    summarize, summarize_outcome, ApplyIntent, ApplyResult, Noun, ResourceEngine, ResourceQuery,
};
use crate::bundle::{read_bundle, BundleSource};
use crate::client::{ensure_initialized, DatastoreClient};
use crate::error::{MigrateError, Stage, StageExt};
use crate::ipam::{IpamPayload, MigrateIpam};
use crate::lock::LockManager;
use crate::schema::{install_definitions, required_definitions, SchemaSummary};

/// Printed once every step has succeeded
pub const SUCCESS_MESSAGE: &str = "Datastore information successfully imported. Please refer to the datastore migration documentation for next steps.";

/// Imports only go into a Kubernetes datastore. Decided from config alone.
pub fn check_destination(config: &DatastoreConfig) -> Result<(), MigrateError> {
    match config.spec.datastore_type {
        DatastoreType::Kubernetes => Ok(()),
        other => Err(MigrateError::UnsupportedDatastore(other)).stage(Stage::Destination),
    }
}

/// What an import did
#[derive(Clone, Debug, Default)]
pub struct ImportReport {
    /// CRD installation counts
    pub schema: SchemaSummary,
    /// v3 resource stage
    pub resources: ApplyResult,
    /// IPAM stage
    pub ipam: ApplyResult,
}

/// Runs an import against one destination
pub struct Importer<'a, C: DatastoreClient + ?Sized> {
    client: &'a C,
    config: &'a DatastoreConfig,
    product_version: String,
}

impl<'a, C: DatastoreClient + ?Sized> Importer<'a, C> {
    /// Create an importer. `config` describes the destination.
    pub fn new(
        client: &'a C,
        config: &'a DatastoreConfig,
        product_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config,
            product_version: product_version.into(),
        }
    }

    /// Import `source`, writing operator progress to `out`.
    pub async fn run<W: Write>(
        &self,
        source: &BundleSource,
        out: &mut W,
    ) -> Result<ImportReport, MigrateError> {
        check_destination(self.config)?;

        let defs = required_definitions().stage(Stage::Schema)?;
        let schema = install_definitions(self.client, &defs)
            .await
            .stage(Stage::Schema)?;

        self.check_empty().await.stage(Stage::Preflight)?;

        ensure_initialized(self.client, &self.product_version)
            .await
            .stage(Stage::Initialize)?;
        LockManager::new(self.client, self.product_version.as_str())
            .ensure_locked(out)
            .await
            .stage(Stage::Lock)?;

        let bundle = read_bundle(source).await.stage(Stage::Bundle)?;
        info!(
            source = %source,
            resources = bundle.resources.len(),
            cluster_info = bundle.cluster_info.len(),
            ipam = bundle.ipam.len(),
            "read migration bundle"
        );

        let resources = self
            .apply_resources(&bundle.resources, out)
            .await
            .stage(Stage::Resources)?;

        self.merge_cluster_info(&bundle.cluster_info)
            .await
            .stage(Stage::ClusterInfo)?;

        writeln!(out, "Importing IPAM resources")
            .map_err(|e| MigrateError::io("writing output", e))
            .stage(Stage::Ipam)?;
        let payload = IpamPayload::from_json(&bundle.ipam).stage(Stage::Ipam)?;
        let ipam = MigrateIpam::new(self.client).push(&payload).await;
        summarize(&ipam, Noun::Ipam, out).stage(Stage::Ipam)?;

        writeln!(out, "{}", SUCCESS_MESSAGE)
            .map_err(|e| MigrateError::io("writing output", e))
            .stage(Stage::Ipam)?;
        Ok(ImportReport {
            schema,
            resources,
            ipam,
        })
    }

    /// Refuse a destination that already holds netplane state.
    async fn check_empty(&self) -> Result<(), MigrateError> {
        let engine = ResourceEngine::new(self.client);
        for kind in ResourceKind::V3.iter().filter(|k| !k.inventory_backed()) {
            let found = match engine.get_or_list(&ResourceQuery::all(*kind)).await {
                Ok(objects) => !objects.is_empty(),
                Err(e) if e.is_not_found() => false,
                Err(source) => return Err(MigrateError::PreflightQuery { kind: *kind, source }),
            };
            if found {
                return Err(MigrateError::ExistingResources { kind: *kind });
            }
            debug!(kind = %kind, "destination has none");
        }

        let cluster_info = match self.client.get_cluster_info().await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => None,
            Err(source) => {
                return Err(MigrateError::PreflightQuery {
                    kind: ResourceKind::ClusterInformation,
                    source,
                })
            }
        };
        if cluster_info.is_some() {
            return Err(MigrateError::ExistingResources {
                kind: ResourceKind::ClusterInformation,
            });
        }

        let snapshot = MigrateIpam::new(self.client)
            .pull()
            .await
            .map_err(MigrateError::PreflightIpam)?;
        if !snapshot.is_empty() {
            return Err(MigrateError::ExistingIpam);
        }
        Ok(())
    }

    async fn apply_resources<W: Write>(
        &self,
        segment: &[u8],
        out: &mut W,
    ) -> Result<ApplyResult, MigrateError> {
        let mut scratch = tempfile::Builder::new()
            .prefix("v3migration")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| MigrateError::io("creating temporary file", e))?;
        scratch
            .write_all(segment)
            .and_then(|_| scratch.flush())
            .map_err(|e| MigrateError::io("writing temporary file", e))?;

        let outcome = ResourceEngine::new(self.client)
            .apply_file(scratch.path(), ApplyIntent::Apply)
            .await;
        summarize_outcome(&outcome, Noun::Resources, out)?;
        Ok(outcome.result)
    }

    /// Copy the source's identity onto the destination record. Only
    /// `clusterGUID` and `productVersion` move, both overwritten even when
    /// the export leaves the version out. The lock stays as it is.
    async fn merge_cluster_info(&self, segment: &[u8]) -> Result<(), MigrateError> {
        let payload_err = |e: &dyn std::fmt::Display| MigrateError::ClusterInfoPayload(e.to_string());
        let text = std::str::from_utf8(segment).map_err(|e| payload_err(&e))?;
        let doc = parse_yaml(text).map_err(|e| payload_err(&e))?;
        let exported: ClusterInformationSpec = match doc.get("spec") {
            Some(spec) => serde_json::from_value(spec.clone()).map_err(|e| payload_err(&e))?,
            None => return Err(payload_err(&"missing spec")),
        };
        let guid = exported
            .cluster_guid
            .filter(|g| !g.is_empty())
            .ok_or_else(|| payload_err(&"missing clusterGUID"))?;

        let mut current = self
            .client
            .get_cluster_info()
            .await?
            .ok_or(MigrateError::ClusterInfoMissing)?;
        current.spec.cluster_guid = Some(guid.clone());
        current.spec.product_version = exported.product_version;
        self.client.update_cluster_info(&current).await?;
        info!(cluster_guid = %guid, "merged cluster information");
        Ok(())
    }
}
