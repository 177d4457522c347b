//! Structural CRDs for kinds whose spec netplane passes through untouched
//!
//! Policy, BGP and Felix specs are validated by the components that consume
//! them, so their CRDs only pin `spec` to an object and preserve every field
//! beneath it.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde_json::json;

use crate::kinds::ResourceKind;
use crate::{Error, CRD_GROUP, CRD_VERSION};

/// Build a preserve-unknown-fields CRD for `kind`.
pub fn opaque_definition(kind: ResourceKind) -> Result<CustomResourceDefinition, Error> {
    let crd_name = kind.crd_name().ok_or_else(|| {
        Error::validation(format!("{} is not backed by a custom resource", kind))
    })?;
    let scope = if kind.namespaced() {
        "Namespaced"
    } else {
        "Cluster"
    };

    let value = json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": crd_name },
        "spec": {
            "group": CRD_GROUP,
            "names": {
                "kind": kind.kind_str(),
                "listKind": format!("{}List", kind.kind_str()),
                "plural": kind.plural(),
                "singular": kind.kind_str().to_lowercase(),
            },
            "scope": scope,
            "versions": [{
                "name": CRD_VERSION,
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "apiVersion": { "type": "string" },
                            "kind": { "type": "string" },
                            "metadata": { "type": "object" },
                            "spec": {
                                "type": "object",
                                "x-kubernetes-preserve-unknown-fields": true
                            }
                        }
                    }
                }
            }]
        }
    });

    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(kind.kind_str(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_kinds_get_namespaced_scope() {
        let crd = opaque_definition(ResourceKind::NetworkPolicy).unwrap();
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("networkpolicies.crd.netplane.dev")
        );
        assert_eq!(crd.spec.names.kind, "NetworkPolicy");
        assert_eq!(crd.spec.names.list_kind.as_deref(), Some("NetworkPolicyList"));
    }

    #[test]
    fn test_cluster_kinds_preserve_spec_fields() {
        let crd = opaque_definition(ResourceKind::FelixConfiguration).unwrap();
        assert_eq!(crd.spec.scope, "Cluster");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1");
        assert!(version.served && version.storage);

        let schema = version
            .schema
            .as_ref()
            .and_then(|s| s.open_api_v3_schema.as_ref())
            .unwrap();
        let spec = &schema.properties.as_ref().unwrap()["spec"];
        assert_eq!(spec.x_kubernetes_preserve_unknown_fields, Some(true));
    }

    #[test]
    fn test_inventory_kinds_have_no_definition() {
        assert!(opaque_definition(ResourceKind::Node).is_err());
    }
}
