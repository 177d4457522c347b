//! Common types for netplane: CRDs, the resource-kind registry, datastore
//! configuration and shared utilities

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod kinds;
pub mod kube_utils;
pub mod net;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API version of the public (bundle/export) resource manifests
pub const V3_API_VERSION: &str = "netplane.dev/v3";

/// API group of the CRDs that back every resource in a Kubernetes datastore
pub const CRD_GROUP: &str = "crd.netplane.dev";

/// Storage version of the netplane CRDs
pub const CRD_VERSION: &str = "v1";

/// Name of the singleton ClusterInformation record
pub const CLUSTER_INFO_NAME: &str = "default";

/// Namespace assumed for namespaced manifests that don't specify one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Version stamped into ClusterInformation when the datastore is initialized
pub const PRODUCT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));
