//! Export a source datastore as a migration bundle
//!
//! The inverse of import: v3 resources become a YAML stream of
//! `netplane.dev/v3` manifests, the cluster identity a JSON manifest and the
//! IPAM state a JSON snapshot. IPPools appear in both the resources and the
//! snapshot; import upserts the second copy over the first.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use netplane_common::kinds::ResourceKind;
use netplane_common::{CLUSTER_INFO_NAME, V3_API_VERSION};

use crate::apply::{ResourceEngine, ResourceQuery};
use crate::bundle::ExportBundle;
use crate::client::DatastoreClient;
use crate::error::MigrateError;
use crate::ipam::MigrateIpam;

/// Kinds written to the resources segment
fn exported_kinds() -> impl Iterator<Item = ResourceKind> {
    ResourceKind::V3.iter().copied().filter(ResourceKind::applicable)
}

/// Reads a datastore into an `ExportBundle`
pub struct Exporter<'a, C: DatastoreClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: DatastoreClient + ?Sized> Exporter<'a, C> {
    /// Create an exporter reading through `client`
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Read everything migration carries.
    pub async fn export(&self) -> Result<ExportBundle, MigrateError> {
        let bundle = ExportBundle {
            resources: self.export_resources().await?,
            cluster_info: self.export_cluster_info().await?,
            ipam: MigrateIpam::new(self.client).pull().await?.to_json()?,
        };
        info!(
            resources = bundle.resources.len(),
            ipam = bundle.ipam.len(),
            "exported datastore"
        );
        Ok(bundle)
    }

    async fn export_resources(&self) -> Result<Vec<u8>, MigrateError> {
        let engine = ResourceEngine::new(self.client);
        let mut docs = Vec::new();

        for kind in exported_kinds() {
            let objects = match engine.get_or_list(&ResourceQuery::all(kind)).await {
                Ok(objects) => objects,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            debug!(kind = %kind, count = objects.len(), "exporting");
            for obj in objects {
                let manifest = to_manifest(kind, obj);
                let doc = serde_yaml::to_string(&manifest).map_err(|e| {
                    netplane_common::Error::serialization_for_kind(kind.kind_str(), e.to_string())
                })?;
                docs.push(doc);
            }
        }

        Ok(docs.join("---\n").into_bytes())
    }

    async fn export_cluster_info(&self) -> Result<Vec<u8>, MigrateError> {
        let info = self
            .client
            .get_cluster_info()
            .await?
            .ok_or(MigrateError::ClusterInfoMissing)?;

        let mut spec = Map::new();
        if let Some(guid) = info.spec.cluster_guid {
            spec.insert("clusterGUID".to_string(), Value::String(guid));
        }
        if let Some(cluster_type) = info.spec.cluster_type {
            spec.insert("clusterType".to_string(), Value::String(cluster_type));
        }
        if let Some(version) = info.spec.product_version {
            spec.insert("productVersion".to_string(), Value::String(version));
        }
        let manifest = json!({
            "apiVersion": V3_API_VERSION,
            "kind": ResourceKind::ClusterInformation.kind_str(),
            "metadata": { "name": CLUSTER_INFO_NAME },
            "spec": spec,
        });

        let mut bytes = serde_json::to_vec(&manifest).map_err(|e| {
            netplane_common::Error::serialization_for_kind("ClusterInformation", e.to_string())
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Render a stored object as a public v3 manifest. Only identity, labels
/// and annotations survive from metadata.
fn to_manifest(kind: ResourceKind, obj: DynamicObject) -> Value {
    let mut metadata = Map::new();
    metadata.insert("name".to_string(), Value::String(obj.name_any()));
    if kind.namespaced() {
        if let Some(ns) = obj.metadata.namespace {
            metadata.insert("namespace".to_string(), Value::String(ns));
        }
    }
    if let Some(labels) = obj.metadata.labels.filter(|l| !l.is_empty()) {
        metadata.insert("labels".to_string(), json!(labels));
    }
    if let Some(annotations) = obj.metadata.annotations.filter(|a| !a.is_empty()) {
        metadata.insert("annotations".to_string(), json!(annotations));
    }

    let mut manifest = Map::new();
    manifest.insert("apiVersion".to_string(), json!(V3_API_VERSION));
    manifest.insert("kind".to_string(), json!(kind.kind_str()));
    manifest.insert("metadata".to_string(), Value::Object(metadata));
    if let Some(spec) = obj.data.get("spec").filter(|s| !s.is_null()) {
        manifest.insert("spec".to_string(), spec.clone());
    }
    Value::Object(manifest)
}
