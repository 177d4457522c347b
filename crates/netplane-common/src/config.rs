//! Datastore connection configuration
//!
//! A `DatastoreConfig` file names the datastore type and how to reach it:
//!
//! ```yaml
//! apiVersion: netplane.dev/v3
//! kind: DatastoreConfig
//! spec:
//!   datastoreType: kubernetes
//!   kubeconfig: /root/.kube/config
//! ```
//!
//! The file is optional when it sits at the default path; environment
//! variables override whatever it sets.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::yaml::parse_yaml;
use crate::Error;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "/etc/netplane/netplane.cfg";

/// Expected `kind` of a config file
pub const CONFIG_KIND: &str = "DatastoreConfig";

/// Overrides `spec.datastoreType`
pub const ENV_DATASTORE_TYPE: &str = "DATASTORE_TYPE";
/// Overrides `spec.kubeconfig`
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
/// Overrides `spec.etcdEndpoints`
pub const ENV_ETCD_ENDPOINTS: &str = "ETCD_ENDPOINTS";

/// Backing store behind the netplane API
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreType {
    /// Standalone etcd v3 cluster
    #[default]
    Etcdv3,
    /// Kubernetes API server, one CRD per kind
    Kubernetes,
}

impl fmt::Display for DatastoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Etcdv3 => f.write_str("etcdv3"),
            Self::Kubernetes => f.write_str("kubernetes"),
        }
    }
}

impl FromStr for DatastoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "etcdv3" => Ok(Self::Etcdv3),
            "kubernetes" => Ok(Self::Kubernetes),
            other => Err(Error::validation_for_field(
                "spec.datastoreType",
                format!("unknown datastore type '{}'", other),
            )),
        }
    }
}

/// Connection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreConfigSpec {
    /// Which datastore to talk to
    #[serde(default)]
    pub datastore_type: DatastoreType,

    /// Kubeconfig for a Kubernetes datastore; inferred when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Comma-separated etcd endpoints for an etcdv3 datastore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd_endpoints: Option<String>,
}

/// A loaded datastore config
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreConfig {
    /// apiVersion of the file, if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// kind of the file, must be `DatastoreConfig` if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Connection settings
    #[serde(default)]
    pub spec: DatastoreConfigSpec,
}

impl DatastoreConfig {
    /// Parse a YAML or JSON config document.
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let value = parse_yaml(input).map_err(|e| Error::config(e.to_string()))?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::config(format!("invalid datastore config: {}", e)))?;
        if let Some(kind) = config.kind.as_deref() {
            if kind != CONFIG_KIND {
                return Err(Error::config(format!(
                    "expected kind {}, found {}",
                    CONFIG_KIND, kind
                )));
            }
        }
        Ok(config)
    }

    /// Load config from `path` (or the default path) and apply process
    /// environment overrides.
    ///
    /// A missing file is only an error when the path was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(
            datastore_type = %config.spec.datastore_type,
            kubeconfig = ?config.spec.kubeconfig,
            "loaded datastore config"
        );
        Ok(config)
    }

    fn read_file(path: Option<&Path>) -> Result<Self, Error> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_yaml(&contents).map_err(|e| match e {
                Error::Config { message, .. } => Error::config_at(&path, message),
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!(path = %path.display(), "no config file, using environment only");
                Ok(Self::default())
            }
            Err(e) => Err(Error::config_at(&path, format!("failed to read: {}", e))),
        }
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = set(ENV_DATASTORE_TYPE) {
            self.spec.datastore_type = value.trim().parse()?;
        }
        if let Some(value) = set(ENV_KUBECONFIG) {
            self.spec.kubeconfig = Some(PathBuf::from(value));
        }
        if let Some(value) = set(ENV_ETCD_ENDPOINTS) {
            self.spec.etcd_endpoints = Some(value);
        }
        Ok(())
    }
}
