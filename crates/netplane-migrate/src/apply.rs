//! Resource apply engine
//!
//! Applies a stream of v3 manifests one by one. There is no transaction:
//! each manifest succeeds or fails on its own and the fold carries on, so a
//! batch can end up partially applied. `ApplyResult` records exactly what
//! happened and `summarize` turns it into operator output and an error.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::Path;

use kube::api::{DynamicObject, ObjectMeta, TypeMeta};
use kube::ResourceExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use netplane_common::kinds::ResourceKind;
use netplane_common::kube_utils::strip_transient_fields;
use netplane_common::yaml::parse_manifest_stream;
use netplane_common::{CRD_GROUP, CRD_VERSION, DEFAULT_NAMESPACE, V3_API_VERSION};

use crate::client::DatastoreClient;
use crate::error::{ErrorList, MigrateError, StoreError};

/// How a manifest is written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyIntent {
    /// Must not exist yet
    Create,
    /// Must already exist
    Replace,
    /// Create, or replace what is there
    Apply,
}

/// Failure of one resource in a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceError {
    /// Which resource, e.g. `IPPool 'pool-a'`
    pub target: String,
    /// What went wrong
    pub message: String,
}

impl ResourceError {
    /// Create a new resource error
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.message)
    }
}

/// Outcome of applying a batch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyResult {
    /// Resources attempted
    pub num_resources: usize,
    /// Resources written
    pub num_handled: usize,
    /// One entry per failed resource
    pub res_errs: Vec<ResourceError>,
    /// The kind, when every resource in the batch had the same one
    pub single_kind: Option<String>,
    kinds: BTreeSet<String>,
    saw_kindless: bool,
}

impl ApplyResult {
    /// Record a written resource
    pub fn record_success(&mut self, kind: &str) {
        self.num_resources += 1;
        self.num_handled += 1;
        self.note_kind(kind);
    }

    /// Record a failed resource
    pub fn record_failure(&mut self, kind: Option<&str>, err: ResourceError) {
        self.num_resources += 1;
        match kind {
            Some(kind) => self.note_kind(kind),
            None => {
                self.saw_kindless = true;
                self.single_kind = None;
            }
        }
        self.res_errs.push(err);
    }

    fn note_kind(&mut self, kind: &str) {
        self.kinds.insert(kind.to_string());
        self.single_kind = if self.kinds.len() == 1 && !self.saw_kindless {
            self.kinds.iter().next().cloned()
        } else {
            None
        };
    }

    /// Whether every attempted resource was written
    pub fn is_complete(&self) -> bool {
        self.res_errs.is_empty()
    }
}

/// Result of running the engine over a file
#[derive(Clone, Debug, Default)]
pub struct CommandOutcome {
    /// Per-resource accounting
    pub result: ApplyResult,
    /// The file could not be read or parsed at all
    pub file_invalid: bool,
    /// Why the file was invalid
    pub error: Option<String>,
}

/// What a batch held, for operator messages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Noun {
    /// Generic v3 resources
    Resources,
    /// IPAM pools, blocks and handles
    Ipam,
}

impl Noun {
    /// Plural used in messages
    pub fn plural(&self) -> &'static str {
        match self {
            Noun::Resources => "resources",
            Noun::Ipam => "IPAM resources",
        }
    }
}

/// Namespaces a query or object covers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Cluster-scoped kind
    Cluster,
    /// One namespace
    Namespace(String),
    /// Every namespace
    AllNamespaces,
}

/// Typed get/list request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Kind to read
    pub kind: ResourceKind,
    /// Only the object with this name
    pub name: Option<String>,
    /// Where to look
    pub scope: NamespaceScope,
}

impl ResourceQuery {
    /// Every object of `kind`, across all namespaces for namespaced kinds.
    pub fn all(kind: ResourceKind) -> Self {
        let scope = if kind.namespaced() {
            NamespaceScope::AllNamespaces
        } else {
            NamespaceScope::Cluster
        };
        Self {
            kind,
            name: None,
            scope,
        }
    }

    /// Restrict to one object name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to one namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.scope = NamespaceScope::Namespace(namespace.into());
        self
    }
}

/// A manifest converted to its stored form
#[derive(Clone, Debug)]
pub struct StoredManifest {
    /// Kind of the manifest
    pub kind: ResourceKind,
    /// Object to write
    pub object: DynamicObject,
}

/// Label for error messages: `Kind 'name'` or `Kind 'ns/name'`
pub fn describe(kind: ResourceKind, name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{} '{}/{}'", kind, ns, name),
        None => format!("{} '{}'", kind, name),
    }
}

/// Validate a v3 manifest and convert it to the stored CRD form.
///
/// Errors carry the best label available for the document.
pub fn to_stored(index: usize, doc: &Value) -> Result<StoredManifest, ResourceError> {
    let unnamed = || format!("document {}", index + 1);

    let obj = doc
        .as_object()
        .ok_or_else(|| ResourceError::new(unnamed(), "manifest is not a mapping"))?;

    let kind_str = obj
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ResourceError::new(unnamed(), "missing kind"))?;
    let kind = ResourceKind::from_kind(kind_str)
        .filter(|k| k.kind_str() == kind_str)
        .ok_or_else(|| ResourceError::new(unnamed(), format!("unknown kind '{}'", kind_str)))?;

    let name = obj
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ResourceError::new(format!("{} ({})", kind, unnamed()), "missing metadata.name")
        })?;
    let label = describe(kind, name, None);

    let api_version = obj.get("apiVersion").and_then(Value::as_str).unwrap_or("");
    let stored_version = format!("{}/{}", CRD_GROUP, CRD_VERSION);
    if api_version != V3_API_VERSION && api_version != stored_version {
        return Err(ResourceError::new(
            label,
            format!("unsupported apiVersion '{}'", api_version),
        ));
    }
    if !kind.applicable() {
        return Err(ResourceError::new(
            label,
            format!("{} resources cannot be applied from a file", kind),
        ));
    }

    let mut metadata: ObjectMeta = serde_json::from_value(obj["metadata"].clone())
        .map_err(|e| ResourceError::new(label.clone(), format!("invalid metadata: {}", e)))?;
    strip_transient_fields(&mut metadata);

    if kind.namespaced() {
        if metadata.namespace.as_deref().map_or(true, str::is_empty) {
            metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
    } else if let Some(ns) = metadata.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        return Err(ResourceError::new(
            label,
            format!("{} is cluster-scoped but namespace '{}' was given", kind, ns),
        ));
    } else {
        metadata.namespace = None;
    }
    let label = describe(kind, name, metadata.namespace.as_deref());

    let mut data = Map::new();
    match obj.get("spec") {
        None | Some(Value::Null) => {}
        Some(spec @ Value::Object(_)) => {
            data.insert("spec".to_string(), spec.clone());
        }
        Some(_) => return Err(ResourceError::new(label, "spec must be a mapping")),
    }

    let ar = kind.api_resource();
    let object = DynamicObject {
        types: Some(TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        }),
        metadata,
        data: Value::Object(data),
    };
    Ok(StoredManifest { kind, object })
}

/// Applies manifests through a `DatastoreClient`
pub struct ResourceEngine<'a, C: DatastoreClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: DatastoreClient + ?Sized> ResourceEngine<'a, C> {
    /// Create an engine writing through `client`
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Apply every manifest in a YAML file.
    pub async fn apply_file(&self, path: &Path, intent: ApplyIntent) -> CommandOutcome {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                return CommandOutcome {
                    file_invalid: true,
                    error: Some(format!("failed to read {}: {}", path.display(), e)),
                    ..Default::default()
                }
            }
        };
        let docs = match parse_manifest_stream(&contents) {
            Ok(docs) => docs,
            Err(e) => {
                return CommandOutcome {
                    file_invalid: true,
                    error: Some(format!("failed to parse {}: {}", path.display(), e)),
                    ..Default::default()
                }
            }
        };
        CommandOutcome {
            result: self.apply_manifests(&docs, intent).await,
            ..Default::default()
        }
    }

    /// Apply manifests in order, continuing past failures.
    pub async fn apply_manifests(&self, docs: &[Value], intent: ApplyIntent) -> ApplyResult {
        let mut result = ApplyResult::default();

        for (index, doc) in docs.iter().enumerate() {
            let manifest = match to_stored(index, doc) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(resource = %err.target, error = %err.message, "rejected manifest");
                    let kind = doc.get("kind").and_then(Value::as_str);
                    result.record_failure(kind, err);
                    continue;
                }
            };

            let kind = manifest.kind;
            let label = describe(
                kind,
                &manifest.object.name_any(),
                manifest.object.metadata.namespace.as_deref(),
            );
            match self.write(kind, manifest.object, intent).await {
                Ok(_) => {
                    debug!(resource = %label, "applied");
                    result.record_success(kind.kind_str());
                }
                Err(e) => {
                    warn!(resource = %label, error = %e, "failed to apply");
                    result.record_failure(
                        Some(kind.kind_str()),
                        ResourceError::new(label, e.to_string()),
                    );
                }
            }
        }

        result
    }

    /// Write one object according to `intent`.
    pub async fn write(
        &self,
        kind: ResourceKind,
        mut obj: DynamicObject,
        intent: ApplyIntent,
    ) -> Result<DynamicObject, StoreError> {
        if intent == ApplyIntent::Create {
            return self.client.create(kind, &obj).await;
        }

        let scope = match obj.metadata.namespace.as_deref() {
            Some(ns) if kind.namespaced() => NamespaceScope::Namespace(ns.to_string()),
            _ => NamespaceScope::Cluster,
        };
        let name = obj.name_any();
        match self.client.get(kind, &name, &scope).await? {
            Some(current) => {
                obj.metadata.resource_version = current.metadata.resource_version;
                self.client.replace(kind, &obj).await
            }
            None if intent == ApplyIntent::Apply => self.client.create(kind, &obj).await,
            None => Err(StoreError::NotFound {
                target: describe(kind, &name, obj.metadata.namespace.as_deref()),
            }),
        }
    }

    /// Objects matching a query.
    pub async fn get_or_list(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        match &query.name {
            Some(name) => Ok(self
                .client
                .get(query.kind, name, &query.scope)
                .await?
                .into_iter()
                .collect()),
            None => self.client.list(query.kind, &query.scope).await,
        }
    }
}

/// Report a batch result to the operator and turn it into an error.
///
/// - nothing attempted: `NothingToApply`
/// - nothing written: `ApplyFailed` with every error
/// - everything written: success line, `Ok`
/// - some written: partial-success line, then `PartialApply`
pub fn summarize<W: Write>(
    result: &ApplyResult,
    noun: Noun,
    out: &mut W,
) -> Result<(), MigrateError> {
    let errors = || ErrorList(result.res_errs.clone());
    let kind = match noun {
        Noun::Resources => result.single_kind.as_deref(),
        Noun::Ipam => None,
    };

    if result.num_handled == 0 {
        if result.num_resources == 0 {
            return Err(MigrateError::NothingToApply { noun });
        }
        let what = match (noun, kind) {
            (Noun::Ipam, _) => "import any IPAM resources".to_string(),
            (Noun::Resources, Some(kind)) if result.num_resources == 1 => {
                format!("apply '{}' resource", kind)
            }
            (Noun::Resources, Some(kind)) => format!("apply any '{}' resources", kind),
            (Noun::Resources, None) => "apply any resources".to_string(),
        };
        return Err(MigrateError::ApplyFailed {
            what,
            errors: errors(),
        });
    }

    let written = |e| MigrateError::io("writing output", e);
    if result.is_complete() {
        match (noun, kind) {
            (Noun::Ipam, _) => writeln!(
                out,
                "Successfully applied {} IPAM resource(s)",
                result.num_handled
            ),
            (Noun::Resources, Some(kind)) => writeln!(
                out,
                "Successfully applied {} '{}' resource(s)",
                result.num_handled, kind
            ),
            (Noun::Resources, None) => {
                writeln!(out, "Successfully applied {} resource(s)", result.num_handled)
            }
        }
        .map_err(written)?;
        return Ok(());
    }

    let noun_text = match kind {
        Some(kind) => format!("'{}' resources", kind),
        None => noun.plural().to_string(),
    };
    writeln!(
        out,
        "Partial success: applied {} out of {} {}:",
        result.num_handled, result.num_resources, noun_text
    )
    .map_err(written)?;
    Err(MigrateError::PartialApply {
        handled: result.num_handled,
        total: result.num_resources,
        errors: errors(),
    })
}

/// Check a `CommandOutcome` for an unreadable file, then summarize it.
pub fn summarize_outcome<W: Write>(
    outcome: &CommandOutcome,
    noun: Noun,
    out: &mut W,
) -> Result<(), MigrateError> {
    if outcome.file_invalid {
        return Err(MigrateError::InvalidFile(
            outcome.error.clone().unwrap_or_default(),
        ));
    }
    summarize(&outcome.result, noun, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDatastore;
    use serde_json::json;

    fn policy(name: &str, ns: Option<&str>) -> Value {
        let mut metadata = json!({ "name": name });
        if let Some(ns) = ns {
            metadata["namespace"] = json!(ns);
        }
        json!({
            "apiVersion": "netplane.dev/v3",
            "kind": "NetworkPolicy",
            "metadata": metadata,
            "spec": { "selector": "app == 'web'", "order": 100 }
        })
    }

    fn network_set(name: &str) -> Value {
        json!({
            "apiVersion": "netplane.dev/v3",
            "kind": "GlobalNetworkSet",
            "metadata": { "name": name, "resourceVersion": "99", "uid": "abc" },
            "spec": { "nets": ["10.0.0.0/8"] }
        })
    }

    #[test]
    fn test_to_stored_converts_to_the_crd_group() {
        let stored = to_stored(0, &network_set("trusted")).unwrap();
        assert_eq!(stored.kind, ResourceKind::GlobalNetworkSet);
        let types = stored.object.types.unwrap();
        assert_eq!(types.api_version, "crd.netplane.dev/v1");
        assert_eq!(types.kind, "GlobalNetworkSet");
        assert!(stored.object.metadata.resource_version.is_none());
        assert!(stored.object.metadata.uid.is_none());
        assert_eq!(stored.object.data["spec"]["nets"][0], "10.0.0.0/8");
    }

    #[test]
    fn test_namespaced_kinds_default_their_namespace() {
        let stored = to_stored(0, &policy("allow-web", None)).unwrap();
        assert_eq!(stored.object.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_to_stored_rejects_bad_manifests() {
        let cases = [
            (json!("just a string"), "manifest is not a mapping"),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "Deployment", "metadata": {"name": "x"}}),
                "unknown kind 'Deployment'",
            ),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "BGPPeer", "metadata": {}}),
                "missing metadata.name",
            ),
            (
                json!({"apiVersion": "v1", "kind": "BGPPeer", "metadata": {"name": "x"}}),
                "unsupported apiVersion 'v1'",
            ),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "BGPPeer", "metadata": {"name": "x"}, "spec": "peer"}),
                "spec must be a mapping",
            ),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "BGPPeer", "metadata": {"name": "x", "namespace": "prod"}}),
                "cluster-scoped",
            ),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "Node", "metadata": {"name": "node-1"}}),
                "cannot be applied",
            ),
            (
                json!({"apiVersion": "netplane.dev/v3", "kind": "IPAMBlock", "metadata": {"name": "b"}}),
                "cannot be applied",
            ),
        ];
        for (doc, expected) in cases {
            let err = to_stored(2, &doc).unwrap_err();
            assert!(
                err.message.contains(expected),
                "expected '{}' in '{}'",
                expected,
                err.message
            );
        }
    }

    #[tokio::test]
    async fn test_apply_creates_then_replaces() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);

        let first = engine
            .apply_manifests(&[network_set("trusted")], ApplyIntent::Apply)
            .await;
        assert_eq!(first.num_handled, 1);

        let mut updated = network_set("trusted");
        updated["spec"]["nets"] = json!(["192.168.0.0/16"]);
        let second = engine.apply_manifests(&[updated], ApplyIntent::Apply).await;
        assert_eq!(second.num_handled, 1);
        assert!(second.is_complete());

        let stored = store
            .object(ResourceKind::GlobalNetworkSet, "trusted")
            .unwrap();
        assert_eq!(stored.data["spec"]["nets"][0], "192.168.0.0/16");
    }

    #[tokio::test]
    async fn test_create_intent_refuses_existing_objects() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);
        engine
            .apply_manifests(&[network_set("trusted")], ApplyIntent::Create)
            .await;

        let result = engine
            .apply_manifests(&[network_set("trusted")], ApplyIntent::Create)
            .await;
        assert_eq!(result.num_handled, 0);
        assert!(result.res_errs[0].message.contains("already exists"));
    }

    #[tokio::test]
    async fn test_replace_intent_requires_existing_objects() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);

        let result = engine
            .apply_manifests(&[network_set("trusted")], ApplyIntent::Replace)
            .await;
        assert_eq!(result.num_handled, 0);
        assert!(result.res_errs[0].message.contains("not found"));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_fold() {
        let store = FakeDatastore::new();
        store.fail_writes_of("blocked");
        let engine = ResourceEngine::new(&store);

        let docs = vec![
            network_set("first"),
            json!({"kind": "GlobalNetworkSet", "apiVersion": "netplane.dev/v3", "metadata": {"name": "bad"}, "spec": []}),
            network_set("blocked"),
            policy("allow-web", Some("prod")),
        ];
        let result = engine.apply_manifests(&docs, ApplyIntent::Apply).await;

        assert_eq!(result.num_resources, 4);
        assert_eq!(result.num_handled, 2);
        assert_eq!(result.res_errs.len(), 2);
        assert_eq!(result.single_kind, None);
        assert!(store.object(ResourceKind::GlobalNetworkSet, "first").is_some());
        assert!(store.object(ResourceKind::NetworkPolicy, "allow-web").is_some());
    }

    #[tokio::test]
    async fn test_single_kind_is_tracked() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);
        let result = engine
            .apply_manifests(&[network_set("a"), network_set("b")], ApplyIntent::Apply)
            .await;
        assert_eq!(result.single_kind.as_deref(), Some("GlobalNetworkSet"));
    }

    #[tokio::test]
    async fn test_kindless_document_clears_single_kind() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);
        let kindless = json!({"apiVersion": "netplane.dev/v3", "metadata": {"name": "x"}});

        let result = engine
            .apply_manifests(
                &[network_set("a"), kindless.clone(), network_set("b")],
                ApplyIntent::Apply,
            )
            .await;
        assert_eq!(result.num_handled, 2);
        assert_eq!(result.single_kind, None);

        let mut out = Vec::new();
        assert!(summarize(&result, Noun::Resources, &mut out).is_err());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Partial success: applied 2 out of 3 resources:\n"
        );

        let result = engine
            .apply_manifests(&[kindless, network_set("c")], ApplyIntent::Apply)
            .await;
        assert_eq!(result.single_kind, None);
    }

    #[tokio::test]
    async fn test_apply_file_flags_unreadable_input() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);

        let outcome = engine
            .apply_file(Path::new("/nonexistent/resources.yaml"), ApplyIntent::Apply)
            .await;
        assert!(outcome.file_invalid);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"kind: [unterminated").unwrap();
        let outcome = engine.apply_file(file.path(), ApplyIntent::Apply).await;
        assert!(outcome.file_invalid);
        assert!(summarize_outcome(&outcome, Noun::Resources, &mut Vec::new())
            .unwrap_err()
            .to_string()
            .starts_with("Failed to execute command"));
    }

    #[tokio::test]
    async fn test_apply_file_reads_a_yaml_stream() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"apiVersion: netplane.dev/v3
kind: BGPPeer
metadata:
  name: rr-1
spec:
  peerIP: 192.0.2.1
  asNumber: 64512
---
apiVersion: netplane.dev/v3
kind: BGPPeer
metadata:
  name: rr-2
spec:
  peerIP: 192.0.2.2
  asNumber: 64512
"#,
        )
        .unwrap();

        let outcome = engine.apply_file(file.path(), ApplyIntent::Apply).await;
        assert!(!outcome.file_invalid);
        assert_eq!(outcome.result.num_handled, 2);
        assert_eq!(store.objects(ResourceKind::BgpPeer).len(), 2);
    }

    #[tokio::test]
    async fn test_get_or_list_honors_query_filters() {
        let store = FakeDatastore::new();
        let engine = ResourceEngine::new(&store);
        engine
            .apply_manifests(
                &[
                    policy("a", Some("prod")),
                    policy("b", Some("dev")),
                    policy("c", Some("prod")),
                ],
                ApplyIntent::Apply,
            )
            .await;

        let all = engine
            .get_or_list(&ResourceQuery::all(ResourceKind::NetworkPolicy))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let prod = engine
            .get_or_list(&ResourceQuery::all(ResourceKind::NetworkPolicy).in_namespace("prod"))
            .await
            .unwrap();
        assert_eq!(prod.len(), 2);

        let one = engine
            .get_or_list(
                &ResourceQuery::all(ResourceKind::NetworkPolicy)
                    .in_namespace("dev")
                    .named("b"),
            )
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name_any(), "b");
    }

    fn result(total: usize, handled: usize, kind: Option<&str>) -> ApplyResult {
        let mut r = ApplyResult::default();
        for i in 0..total {
            let k = kind.map(str::to_string).unwrap_or_else(|| format!("Kind{}", i));
            if i < handled {
                r.record_success(&k);
            } else {
                r.record_failure(Some(&k), ResourceError::new(format!("{} 'r{}'", k, i), "denied"));
            }
        }
        r
    }

    #[test]
    fn test_summarize_empty_batch() {
        let err = summarize(&ApplyResult::default(), Noun::Resources, &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "No resources specified in file");
    }

    #[test]
    fn test_summarize_total_failure_wording() {
        let one = summarize(&result(1, 0, Some("IPPool")), Noun::Resources, &mut Vec::new())
            .unwrap_err();
        assert!(one.to_string().starts_with("Failed to apply 'IPPool' resource: ["));

        let many = summarize(&result(3, 0, Some("IPPool")), Noun::Resources, &mut Vec::new())
            .unwrap_err();
        assert!(many
            .to_string()
            .starts_with("Failed to apply any 'IPPool' resources: ["));

        let mixed = summarize(&result(3, 0, None), Noun::Resources, &mut Vec::new()).unwrap_err();
        assert!(mixed.to_string().starts_with("Failed to apply any resources: ["));

        let ipam = summarize(&result(3, 0, None), Noun::Ipam, &mut Vec::new()).unwrap_err();
        assert!(ipam
            .to_string()
            .starts_with("Failed to import any IPAM resources: ["));
    }

    #[test]
    fn test_summarize_full_success_prints_count() {
        let mut out = Vec::new();
        summarize(&result(3, 3, None), Noun::Resources, &mut out).unwrap();
        summarize(&result(2, 2, Some("BGPPeer")), Noun::Resources, &mut out).unwrap();
        summarize(&result(2, 2, None), Noun::Ipam, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Successfully applied 3 resource(s)\n\
             Successfully applied 2 'BGPPeer' resource(s)\n\
             Successfully applied 2 IPAM resource(s)\n"
        );
    }

    #[test]
    fn test_summarize_partial_success_is_an_error_after_the_count() {
        let mut out = Vec::new();
        let err = summarize(&result(3, 2, None), Noun::Resources, &mut out).unwrap_err();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Partial success: applied 2 out of 3 resources:\n"
        );
        match err {
            MigrateError::PartialApply {
                handled,
                total,
                errors,
            } => {
                assert_eq!((handled, total), (2, 3));
                assert_eq!(errors.0.len(), 1);
            }
            other => panic!("expected PartialApply, got {:?}", other),
        }

        let mut out = Vec::new();
        summarize(&result(5, 3, None), Noun::Ipam, &mut out).unwrap_err();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Partial success: applied 3 out of 5 IPAM resources:\n"
        );
    }
}
