//! ClusterInformation Custom Resource Definition
//!
//! A cluster-scoped singleton named `default`. It carries the cluster's
//! identity and the `datastoreReady` flag that acts as the migration lock:
//! consumers treat the datastore as authoritative only while it is true.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for ClusterInformation
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.netplane.dev",
    version = "v1",
    kind = "ClusterInformation",
    plural = "clusterinformations",
    printcolumn = r#"{"name":"GUID","type":"string","jsonPath":".spec.clusterGUID"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".spec.datastoreReady"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.productVersion"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInformationSpec {
    /// Opaque cluster identifier, set once when the cluster is created
    #[serde(
        rename = "clusterGUID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_guid: Option<String>,

    /// Comma-separated list of cluster traits (e.g. "k8s,bgp")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,

    /// Version of the product that last initialized the datastore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,

    /// Whether consumers may treat the datastore as authoritative.
    /// Absent means ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_ready: Option<bool>,
}

impl ClusterInformationSpec {
    /// Whether the datastore is ready (unlocked). An unset flag counts as ready.
    pub fn is_ready(&self) -> bool {
        self.datastore_ready != Some(false)
    }
}

impl ClusterInformation {
    /// A freshly initialized, unlocked record.
    pub fn initial(cluster_guid: impl Into<String>, product_version: impl Into<String>) -> Self {
        Self::new(
            crate::CLUSTER_INFO_NAME,
            ClusterInformationSpec {
                cluster_guid: Some(cluster_guid.into()),
                cluster_type: None,
                product_version: Some(product_version.into()),
                datastore_ready: Some(true),
            },
        )
    }

    /// Whether the migration lock is held.
    pub fn is_locked(&self) -> bool {
        !self.spec.is_ready()
    }
}
