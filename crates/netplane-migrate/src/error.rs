//! Error types for datastore migration

use std::fmt;

use netplane_common::config::DatastoreType;
use netplane_common::kinds::ResourceKind;
use thiserror::Error;

use crate::apply::{Noun, ResourceError};
use crate::bundle::BundleError;

/// Errors from a single datastore call
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object (or its kind) does not exist
    #[error("{target} not found")]
    NotFound {
        /// What was looked up, e.g. `IPPool 'pool-a'`
        target: String,
    },

    /// Create of an object that already exists
    #[error("{target} already exists")]
    AlreadyExists {
        /// What was created
        target: String,
    },

    /// Write rejected because the resourceVersion is stale
    #[error("update conflict on {target}: {message}")]
    Conflict {
        /// What was written
        target: String,
        /// Server message
        message: String,
    },

    /// Object rejected by schema validation
    #[error("{target} is invalid: {message}")]
    Invalid {
        /// What was written
        target: String,
        /// Server message
        message: String,
    },

    /// Any other API or transport failure
    #[error("{target}: {source}")]
    Api {
        /// What was being accessed
        target: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Object could not be converted to or from its stored form
    #[error(transparent)]
    Common(#[from] netplane_common::Error),
}

impl StoreError {
    /// Classify a kube error by HTTP status.
    pub fn from_kube(target: impl Into<String>, err: kube::Error) -> Self {
        let target = target.into();
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound { target },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                StoreError::AlreadyExists { target }
            }
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
                target,
                message: resp.message.clone(),
            },
            kube::Error::Api(resp) if resp.code == 422 => StoreError::Invalid {
                target,
                message: resp.message.clone(),
            },
            _ => StoreError::Api {
                target,
                source: err,
            },
        }
    }

    /// Whether the object or kind was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether a create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// Whether a write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Per-resource errors rendered as `[a; b; c]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(pub Vec<ResourceError>);

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        f.write_str("]")
    }
}

/// Import pipeline stage, used to prefix errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Destination type check
    Destination,
    /// CRD installation
    Schema,
    /// Destination emptiness check
    Preflight,
    /// ClusterInformation initialization
    Initialize,
    /// Taking the migration lock
    Lock,
    /// Reading and splitting the bundle
    Bundle,
    /// Applying resources
    Resources,
    /// Merging cluster identity
    ClusterInfo,
    /// Pushing IPAM state
    Ipam,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Destination => "Unsupported import destination",
            Stage::Schema => "Error applying the CRDs necessary to begin datastore import",
            Stage::Preflight => "Destination datastore is not ready for import",
            Stage::Initialize => {
                "Unable to initialize cluster information for the datastore migration"
            }
            Stage::Lock => "Error while attempting to lock the datastore for import",
            Stage::Bundle => "Error while reading migration file",
            Stage::Resources => "Failed to import v3 resources",
            Stage::ClusterInfo => "Failed to update cluster information",
            Stage::Ipam => "Failed to import IPAM resources",
        };
        f.write_str(s)
    }
}

/// Errors from migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Import target is not a Kubernetes datastore
    #[error("Invalid datastore type: {0} to import to for datastore migration. Datastore type must be kubernetes")]
    UnsupportedDatastore(DatastoreType),

    /// CRD create failed for a reason other than already existing
    #[error("Error creating CRD {name}: {source}")]
    SchemaCreate {
        /// CRD name
        name: String,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Existing CRD could not be read back for update
    #[error("Error retrieving existing CRD to update: {name}: {source}")]
    SchemaFetch {
        /// CRD name
        name: String,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Existing CRD could not be replaced
    #[error("Error updating CRD {name}: {source}")]
    SchemaUpdate {
        /// CRD name
        name: String,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Destination already holds resources of a kind
    #[error("Found existing {kind} resource. Clear out all netplane resources by deleting all netplane CRDs")]
    ExistingResources {
        /// Offending kind
        kind: ResourceKind,
    },

    /// Destination could not be checked for a kind
    #[error("Failed to retrieve {} resources during datastore check: {source}", .kind.display_name())]
    PreflightQuery {
        /// Kind being checked
        kind: ResourceKind,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Destination already holds IPAM state
    #[error("Found existing IPAM resources. Clear out all netplane resources by deleting all netplane CRDs")]
    ExistingIpam,

    /// Destination IPAM state could not be read
    #[error("Failed to retrieve IPAM resources during datastore check: {0}")]
    PreflightIpam(#[source] StoreError),

    /// ClusterInformation is missing after initialization
    #[error("cluster information '{}' does not exist", netplane_common::CLUSTER_INFO_NAME)]
    ClusterInfoMissing,

    /// Cluster identity segment could not be decoded
    #[error("Error reading exported cluster info for migration: {0}")]
    ClusterInfoPayload(String),

    /// IPAM segment could not be decoded
    #[error("Failed to read IPAM resources: {0}")]
    IpamPayload(String),

    /// Bundle could not be read or split
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// Apply input could not be read or parsed at all
    #[error("Failed to execute command: {0}")]
    InvalidFile(String),

    /// Batch was empty
    #[error("No {} specified in file", .noun.plural())]
    NothingToApply {
        /// What the batch held
        noun: Noun,
    },

    /// Batch was non-empty but nothing succeeded
    #[error("Failed to {what}: {errors}")]
    ApplyFailed {
        /// Description of the failed action
        what: String,
        /// Per-resource errors
        errors: ErrorList,
    },

    /// Some but not all of a batch succeeded
    #[error("Hit error(s): {errors}")]
    PartialApply {
        /// Resources written
        handled: usize,
        /// Resources attempted
        total: usize,
        /// Per-resource errors
        errors: ErrorList,
    },

    /// Datastore call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local I/O failed (scratch file, operator output)
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Shared-crate failure (serialization, validation)
    #[error(transparent)]
    Common(#[from] netplane_common::Error),

    /// Failure inside an import stage
    #[error("{stage}: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Underlying failure
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Wrap an I/O error with what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MigrateError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stage the error came from, if it was raised inside the import pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MigrateError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, unwrapping stage context
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach an import stage to a failure
pub trait StageExt<T> {
    /// Wrap the error in `MigrateError::Stage`
    fn stage(self, stage: Stage) -> Result<T, MigrateError>;
}

impl<T, E: Into<MigrateError>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, MigrateError> {
        self.map_err(|e| MigrateError::Stage {
            stage,
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_kube_errors_are_classified_by_status() {
        assert!(StoreError::from_kube("IPPool 'a'", api_error(404, "NotFound")).is_not_found());
        assert!(
            StoreError::from_kube("IPPool 'a'", api_error(409, "AlreadyExists"))
                .is_already_exists()
        );
        assert!(StoreError::from_kube("IPPool 'a'", api_error(409, "Conflict")).is_conflict());
        assert!(matches!(
            StoreError::from_kube("IPPool 'a'", api_error(422, "Invalid")),
            StoreError::Invalid { .. }
        ));
        assert!(matches!(
            StoreError::from_kube("IPPool 'a'", api_error(500, "InternalError")),
            StoreError::Api { .. }
        ));
    }

    #[test]
    fn test_store_errors_name_their_target() {
        let err = StoreError::from_kube("BGPPeer 'rr-1'", api_error(409, "Conflict"));
        assert_eq!(
            err.to_string(),
            "update conflict on BGPPeer 'rr-1': Conflict happened"
        );
    }

    #[test]
    fn test_error_list_display() {
        let list = ErrorList(vec![
            ResourceError::new("NetworkPolicy 'prod/a'", "spec must be a mapping"),
            ResourceError::new("IPPool 'b'", "denied"),
        ]);
        assert_eq!(
            list.to_string(),
            "[NetworkPolicy 'prod/a': spec must be a mapping; IPPool 'b': denied]"
        );
        assert_eq!(ErrorList::default().to_string(), "[]");
    }

    #[test]
    fn test_stage_wraps_and_unwraps() {
        let result: Result<(), MigrateError> = Err(MigrateError::ExistingIpam);
        let err = result.stage(Stage::Preflight).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Preflight));
        assert!(matches!(err.root(), MigrateError::ExistingIpam));
        assert!(err
            .to_string()
            .starts_with("Destination datastore is not ready for import: Found existing IPAM"));
    }

    #[test]
    fn test_store_errors_convert_into_stages() {
        let result: Result<(), StoreError> = Err(StoreError::NotFound {
            target: "ClusterInformation 'default'".to_string(),
        });
        let err = result.stage(Stage::ClusterInfo).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to update cluster information: ClusterInformation 'default' not found"
        );
    }

    #[test]
    fn test_unsupported_datastore_message() {
        let err = MigrateError::UnsupportedDatastore(DatastoreType::Etcdv3);
        assert_eq!(
            err.to_string(),
            "Invalid datastore type: etcdv3 to import to for datastore migration. Datastore type must be kubernetes"
        );
    }

    #[test]
    fn test_nothing_to_apply_uses_noun() {
        assert_eq!(
            MigrateError::NothingToApply {
                noun: Noun::Resources
            }
            .to_string(),
            "No resources specified in file"
        );
        assert_eq!(
            MigrateError::NothingToApply { noun: Noun::Ipam }.to_string(),
            "No IPAM resources specified in file"
        );
    }
}
