//! Datastore client used by every migration step
//!
//! The trait keeps migration logic independent of the transport so tests can
//! drive it with mocks or an in-memory store, while `KubeDatastore` talks to
//! a real API server.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, ListParams, PostParams, TypeMeta};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use netplane_common::crd::ClusterInformation;
use netplane_common::kinds::ResourceKind;
use netplane_common::CLUSTER_INFO_NAME;

use crate::apply::NamespaceScope;
use crate::error::StoreError;

/// Operations migration needs from a datastore
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatastoreClient: Send + Sync {
    /// Create a CRD
    async fn create_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError>;

    /// Fetch a CRD by name
    async fn get_definition(&self, name: &str) -> Result<CustomResourceDefinition, StoreError>;

    /// Replace a CRD; `metadata.resourceVersion` must be current
    async fn replace_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError>;

    /// List objects of a kind within a scope
    ///
    /// Returns `NotFound` when the kind itself is not served.
    async fn list(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Fetch one object, `None` if it does not exist
    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: &NamespaceScope,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// Create an object; fails with `AlreadyExists` if present
    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace an object; `metadata.resourceVersion` must be current
    async fn replace(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Fetch the ClusterInformation singleton
    async fn get_cluster_info(&self) -> Result<Option<ClusterInformation>, StoreError>;

    /// Create the ClusterInformation singleton
    async fn create_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError>;

    /// Replace the ClusterInformation singleton; the resourceVersion carried
    /// by `info` must be current
    async fn update_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError>;
}

/// Make sure the ClusterInformation singleton exists and is complete.
///
/// A missing record is created with a fresh GUID, `product_version` and an
/// unlocked datastore. An existing record only has unset fields filled in;
/// a lock already held is left alone.
pub async fn ensure_initialized<C>(client: &C, product_version: &str) -> Result<(), StoreError>
where
    C: DatastoreClient + ?Sized,
{
    let Some(mut info) = client.get_cluster_info().await? else {
        let guid = uuid::Uuid::new_v4().simple().to_string();
        let info = ClusterInformation::initial(&guid, product_version);
        return match client.create_cluster_info(&info).await {
            Ok(_) => {
                info!(cluster_guid = %guid, "initialized cluster information");
                Ok(())
            }
            // Someone else initialized it between our read and create
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        };
    };

    let spec = &mut info.spec;
    let mut changed = false;
    if spec.cluster_guid.as_deref().map_or(true, str::is_empty) {
        spec.cluster_guid = Some(uuid::Uuid::new_v4().simple().to_string());
        changed = true;
    }
    if spec.product_version.is_none() {
        spec.product_version = Some(product_version.to_string());
        changed = true;
    }
    if spec.datastore_ready.is_none() {
        spec.datastore_ready = Some(true);
        changed = true;
    }

    if changed {
        client.update_cluster_info(&info).await?;
        debug!("filled in missing cluster information fields");
    }
    Ok(())
}

/// `DatastoreClient` backed by a Kubernetes API server
pub struct KubeDatastore {
    client: Client,
}

impl KubeDatastore {
    /// Create a new KubeDatastore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, kind: ResourceKind, scope: &NamespaceScope) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match scope {
            NamespaceScope::Namespace(ns) if kind.namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn object_api(&self, kind: ResourceKind, obj: &DynamicObject) -> Api<DynamicObject> {
        let scope = match obj.metadata.namespace.as_deref() {
            Some(ns) if kind.namespaced() => NamespaceScope::Namespace(ns.to_string()),
            _ => NamespaceScope::Cluster,
        };
        self.dynamic_api(kind, &scope)
    }

    fn crd_api(&self) -> Api<CustomResourceDefinition> {
        Api::all(self.client.clone())
    }

    fn cluster_info_api(&self) -> Api<ClusterInformation> {
        Api::all(self.client.clone())
    }
}

/// List responses may omit per-item type information.
fn with_types(kind: ResourceKind, mut obj: DynamicObject) -> DynamicObject {
    if obj.types.is_none() {
        let ar = kind.api_resource();
        obj.types = Some(TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        });
    }
    obj
}

fn target(kind: ResourceKind, obj: &DynamicObject) -> String {
    match obj.metadata.namespace.as_deref() {
        Some(ns) if kind.namespaced() => format!("{} '{}/{}'", kind, ns, obj.name_any()),
        _ => format!("{} '{}'", kind, obj.name_any()),
    }
}

#[async_trait]
impl DatastoreClient for KubeDatastore {
    async fn create_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError> {
        self.crd_api()
            .create(&PostParams::default(), crd)
            .await
            .map_err(|e| StoreError::from_kube(format!("CRD '{}'", crd.name_any()), e))
    }

    async fn get_definition(&self, name: &str) -> Result<CustomResourceDefinition, StoreError> {
        self.crd_api()
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(format!("CRD '{}'", name), e))
    }

    async fn replace_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError> {
        let name = crd.name_any();
        self.crd_api()
            .replace(&name, &PostParams::default(), crd)
            .await
            .map_err(|e| StoreError::from_kube(format!("CRD '{}'", name), e))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let list = self
            .dynamic_api(kind, scope)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(kind.display_name(), e))?;
        Ok(list
            .items
            .into_iter()
            .map(|obj| with_types(kind, obj))
            .collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: &NamespaceScope,
    ) -> Result<Option<DynamicObject>, StoreError> {
        if kind.namespaced() && !matches!(scope, NamespaceScope::Namespace(_)) {
            return Err(StoreError::Common(netplane_common::Error::validation(format!(
                "{} is namespaced; a get needs a namespace",
                kind
            ))));
        }
        self.dynamic_api(kind, scope)
            .get_opt(name)
            .await
            .map(|found| found.map(|obj| with_types(kind, obj)))
            .map_err(|e| StoreError::from_kube(format!("{} '{}'", kind, name), e))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.object_api(kind, obj)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(target(kind, obj), e))
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.object_api(kind, obj)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(target(kind, obj), e))
    }

    async fn get_cluster_info(&self) -> Result<Option<ClusterInformation>, StoreError> {
        self.cluster_info_api()
            .get_opt(CLUSTER_INFO_NAME)
            .await
            .map_err(|e| StoreError::from_kube("ClusterInformation 'default'", e))
    }

    async fn create_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError> {
        self.cluster_info_api()
            .create(&PostParams::default(), info)
            .await
            .map_err(|e| StoreError::from_kube("ClusterInformation 'default'", e))
    }

    async fn update_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError> {
        self.cluster_info_api()
            .replace(CLUSTER_INFO_NAME, &PostParams::default(), info)
            .await
            .map_err(|e| StoreError::from_kube("ClusterInformation 'default'", e))
    }
}
