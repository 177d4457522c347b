//! In-memory datastore for exercising whole migration flows in tests
//!
//! Enforces the same rules a Kubernetes API server does for the calls
//! migration makes: create fails on existing names, replace needs the
//! current resourceVersion, every write bumps a global version counter.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use kube::ResourceExt;

use netplane_common::crd::{ClusterInformation, ClusterInformationSpec};
use netplane_common::kinds::ResourceKind;
use netplane_common::CLUSTER_INFO_NAME;

use crate::apply::NamespaceScope;
use crate::client::DatastoreClient;
use crate::error::StoreError;

type ObjectKey = (ResourceKind, Option<String>, String);

#[derive(Default)]
struct State {
    crds: BTreeMap<String, CustomResourceDefinition>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    cluster_info: Option<ClusterInformation>,
    next_version: u64,
    writes: usize,
    failing_lists: HashSet<ResourceKind>,
    failing_writes: HashSet<String>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.writes += 1;
        self.next_version.to_string()
    }
}

/// In-memory `DatastoreClient`
#[derive(Default)]
pub struct FakeDatastore {
    state: Mutex<State>,
}

fn key(kind: ResourceKind, obj: &DynamicObject) -> ObjectKey {
    let ns = if kind.namespaced() {
        obj.metadata.namespace.clone()
    } else {
        None
    };
    (kind, ns, obj.name_any())
}

fn label(kind: ResourceKind, name: &str) -> String {
    format!("{} '{}'", kind, name)
}

impl FakeDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Store an object as if another writer had created it.
    pub fn seed(&self, kind: ResourceKind, mut obj: DynamicObject) {
        let mut state = self.state();
        obj.metadata.resource_version = Some(state.bump());
        state.objects.insert(key(kind, &obj), obj);
    }

    pub fn seed_cluster_info(&self, spec: ClusterInformationSpec) {
        let mut state = self.state();
        let mut info = ClusterInformation::new(CLUSTER_INFO_NAME, spec);
        info.metadata.resource_version = Some(state.bump());
        state.cluster_info = Some(info);
    }

    pub fn objects(&self, kind: ResourceKind) -> Vec<DynamicObject> {
        self.state()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<DynamicObject> {
        self.objects(kind).into_iter().find(|o| o.name_any() == name)
    }

    pub fn definitions(&self) -> Vec<CustomResourceDefinition> {
        self.state().crds.values().cloned().collect()
    }

    pub fn cluster_info(&self) -> Option<ClusterInformation> {
        self.state().cluster_info.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Make every list of `kind` fail with a server error.
    pub fn fail_lists_of(&self, kind: ResourceKind) {
        self.state().failing_lists.insert(kind);
    }

    /// Make every write of the named object fail with an invalid error.
    pub fn fail_writes_of(&self, name: &str) {
        self.state().failing_writes.insert(name.to_string());
    }
}

#[async_trait]
impl DatastoreClient for FakeDatastore {
    async fn create_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError> {
        let mut state = self.state();
        let name = crd.name_any();
        if state.crds.contains_key(&name) {
            return Err(StoreError::AlreadyExists {
                target: format!("CRD '{}'", name),
            });
        }
        let mut stored = crd.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.crds.insert(name, stored.clone());
        Ok(stored)
    }

    async fn get_definition(&self, name: &str) -> Result<CustomResourceDefinition, StoreError> {
        self.state()
            .crds
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                target: format!("CRD '{}'", name),
            })
    }

    async fn replace_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, StoreError> {
        let mut state = self.state();
        let name = crd.name_any();
        let current = state
            .crds
            .get(&name)
            .ok_or_else(|| StoreError::NotFound {
                target: format!("CRD '{}'", name),
            })?;
        if current.metadata.resource_version != crd.metadata.resource_version {
            return Err(StoreError::Conflict {
                target: format!("CRD '{}'", name),
                message: "resourceVersion mismatch".to_string(),
            });
        }
        let mut stored = crd.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.crds.insert(name, stored.clone());
        Ok(stored)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let state = self.state();
        if state.failing_lists.contains(&kind) {
            return Err(StoreError::Invalid {
                target: kind.display_name().to_string(),
                message: "injected list failure".to_string(),
            });
        }
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind
                    && match scope {
                        NamespaceScope::Namespace(want) if kind.namespaced() => {
                            ns.as_deref() == Some(want.as_str())
                        }
                        _ => true,
                    }
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: &NamespaceScope,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let ns = match scope {
            NamespaceScope::Namespace(ns) if kind.namespaced() => Some(ns.clone()),
            _ => None,
        };
        Ok(self
            .state()
            .objects
            .get(&(kind, ns, name.to_string()))
            .cloned())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        let name = obj.name_any();
        if state.failing_writes.contains(&name) {
            return Err(StoreError::Invalid {
                target: label(kind, &name),
                message: "injected write failure".to_string(),
            });
        }
        let k = key(kind, obj);
        if state.objects.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                target: label(kind, &name),
            });
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state();
        let name = obj.name_any();
        if state.failing_writes.contains(&name) {
            return Err(StoreError::Invalid {
                target: label(kind, &name),
                message: "injected write failure".to_string(),
            });
        }
        let k = key(kind, obj);
        let current = state.objects.get(&k).ok_or_else(|| StoreError::NotFound {
            target: label(kind, &name),
        })?;
        if current.metadata.resource_version != obj.metadata.resource_version {
            return Err(StoreError::Conflict {
                target: label(kind, &name),
                message: "resourceVersion mismatch".to_string(),
            });
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get_cluster_info(&self) -> Result<Option<ClusterInformation>, StoreError> {
        Ok(self.state().cluster_info.clone())
    }

    async fn create_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError> {
        let mut state = self.state();
        if state.cluster_info.is_some() {
            return Err(StoreError::AlreadyExists {
                target: "ClusterInformation 'default'".to_string(),
            });
        }
        let mut stored = info.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.cluster_info = Some(stored.clone());
        Ok(stored)
    }

    async fn update_cluster_info(
        &self,
        info: &ClusterInformation,
    ) -> Result<ClusterInformation, StoreError> {
        let mut state = self.state();
        let current = state
            .cluster_info
            .as_ref()
            .ok_or_else(|| StoreError::NotFound {
                target: "ClusterInformation 'default'".to_string(),
            })?;
        if current.metadata.resource_version != info.metadata.resource_version {
            return Err(StoreError::Conflict {
                target: "ClusterInformation 'default'".to_string(),
                message: "resourceVersion mismatch".to_string(),
            });
        }
        let mut stored = info.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.cluster_info = Some(stored.clone());
        Ok(stored)
    }
}
