//! Datastore migration for netplane
//!
//! Moves a cluster's netplane state (policy and network resources, cluster
//! identity, IPAM allocations) from one datastore into a Kubernetes CRD
//! datastore.
//!
//! ## Import pipeline
//!
//! ```text
//! 1. Destination must be a kubernetes datastore (config only, no I/O)
//! 2. Install CRDs                       create, or fetch + replace
//! 3. Preflight: destination is empty    every kind but Node, then IPAM
//! 4. Ensure ClusterInformation exists, lock it (datastoreReady = false)
//! 5. Read bundle, split on "===\n"      resources | cluster info | IPAM
//! 6. Apply resources                    fold, partial success is fatal
//! 7. Merge clusterGUID + productVersion into ClusterInformation
//! 8. Push IPAM                          pools -> blocks -> handles
//! ```
//!
//! Every step is gated on the previous one. Nothing is rolled back: a failed
//! import leaves whatever it already wrote, and the operator cleans up and
//! retries.
//!
//! The datastore stays locked after a successful import; `unlock` is a
//! separate operator action once the cluster has been switched over.

pub mod apply;
pub mod bundle;
pub mod client;
mod error;
pub mod export;
pub mod import;
pub mod ipam;
pub mod lock;
pub mod schema;

#[cfg(test)]
mod fake;

pub use apply::{
    summarize, ApplyIntent, ApplyResult, CommandOutcome, NamespaceScope, Noun, ResourceEngine,
    ResourceError, ResourceQuery,
};
pub use bundle::{read_bundle, BundleError, BundleSource, ExportBundle, DELIMITER};
pub use client::{ensure_initialized, DatastoreClient, KubeDatastore};
pub use error::{ErrorList, MigrateError, Stage, StageExt, StoreError};
pub use export::Exporter;
pub use import::{check_destination, ImportReport, Importer};
pub use ipam::{IpamPayload, IpamSnapshot, MigrateIpam};
pub use lock::LockManager;
pub use schema::{install_definitions, required_definitions, SchemaDefinition, SchemaSummary};
