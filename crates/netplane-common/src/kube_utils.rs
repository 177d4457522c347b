//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction with bounded timeouts, ApiResource building for
//! manifests whose apiVersion is only known at runtime, and metadata
//! scrubbing for objects copied between datastores.

use std::path::Path;
use std::time::Duration;

use kube::api::{DynamicObject, ObjectMeta};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::debug;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Without a path the config is inferred (in-cluster service account, then
/// `$KUBECONFIG`, then `~/.kube/config`).
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(kubeconfig = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Parse an apiVersion into (group, version)
///
/// ```
/// use netplane_common::kube_utils::parse_api_version;
///
/// assert_eq!(
///     parse_api_version("netplane.dev/v3"),
///     ("netplane.dev".to_string(), "v3".to_string())
/// );
/// assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from an apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Pluralize a Kubernetes resource kind with simple English rules
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Strip server-assigned metadata from an object copied between datastores.
///
/// Removes uid, resourceVersion, creationTimestamp, managedFields,
/// generation, selfLink and ownerReferences, since none of them are valid on
/// the receiving side.
pub fn strip_transient_fields(meta: &mut ObjectMeta) {
    meta.uid = None;
    meta.resource_version = None;
    meta.creation_timestamp = None;
    meta.managed_fields = None;
    meta.generation = None;
    meta.self_link = None;
    meta.owner_references = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
}

/// Build a DynamicObject of `ar` carrying `data` (spec and friends) under
/// the given name and optional namespace.
pub fn dynamic_object(
    ar: &ApiResource,
    name: &str,
    namespace: Option<&str>,
    data: serde_json::Value,
) -> DynamicObject {
    let mut obj = DynamicObject::new(name, ar).data(data);
    obj.metadata.namespace = namespace.map(str::to_string);
    obj
}

/// Convert a typed resource into a DynamicObject.
pub fn to_dynamic<T: serde::Serialize>(resource: &T) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(resource)
        .map_err(|e| Error::serialization(format!("failed to encode resource: {}", e)))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("failed to convert resource: {}", e)))
}

/// Convert a DynamicObject into a typed resource.
pub fn from_dynamic<T: serde::de::DeserializeOwned>(obj: DynamicObject) -> Result<T, Error> {
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default();
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization_for_kind(kind.clone(), e.to_string()))?;
    serde_json::from_value(value).map_err(|e| {
        Error::serialization_for_kind(kind.clone(), format!("failed to decode {}: {}", kind, e))
    })
}
