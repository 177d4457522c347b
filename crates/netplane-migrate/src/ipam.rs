//! IPAM state transfer
//!
//! A snapshot is the pools, blocks and handles of a datastore, serialized as
//! one JSON document. Blocks carry their own allocation map, so the
//! BlockAffinity of a node-affine block is not exported; it is rebuilt from
//! the block's `affinity` on import.
//!
//! Import validates every item before writing it. A malformed item is
//! recorded and skipped and the rest still land, so the destination can end
//! up with a partial IPAM state.

use std::collections::HashSet;

use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use netplane_common::crd::{
    BlockAffinity, IpPool, IpPoolSpec, IpamBlock, IpamBlockSpec, IpamHandle, IpamHandleSpec,
};
use netplane_common::kinds::ResourceKind;
use netplane_common::kube_utils::{from_dynamic, strip_transient_fields, to_dynamic};
use netplane_common::net::Cidr;

use crate::apply::{
    describe, ApplyIntent, ApplyResult, NamespaceScope, ResourceEngine, ResourceError,
};
use crate::client::DatastoreClient;
use crate::error::{MigrateError, StoreError};

/// Smallest IPv4 block prefix a pool may use
const MIN_V4_BLOCK_SIZE: u8 = 20;
/// Smallest IPv6 block prefix a pool may use
const MIN_V6_BLOCK_SIZE: u8 = 116;

/// Typed IPAM state of a datastore
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamSnapshot {
    /// Address pools
    #[serde(default)]
    pub ip_pools: Vec<IpPool>,
    /// Allocation blocks
    #[serde(default)]
    pub blocks: Vec<IpamBlock>,
    /// Allocation handles
    #[serde(default)]
    pub handles: Vec<IpamHandle>,
}

impl IpamSnapshot {
    /// Whether the snapshot holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.ip_pools.is_empty() && self.blocks.is_empty() && self.handles.is_empty()
    }

    /// Number of items across all collections.
    pub fn len(&self) -> usize {
        self.ip_pools.len() + self.blocks.len() + self.handles.len()
    }

    /// Serialize as the IPAM segment of a bundle.
    pub fn to_json(&self) -> Result<Vec<u8>, MigrateError> {
        let mut bytes = serde_json::to_vec(self).map_err(|e| {
            netplane_common::Error::serialization(format!("failed to encode IPAM snapshot: {}", e))
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// IPAM segment as read from a bundle, items still undecoded
///
/// Only the top-level shape has to be right; each item is decoded on its
/// own so one bad entry doesn't sink the others.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamPayload {
    /// Raw pool manifests
    #[serde(default)]
    pub ip_pools: Vec<Value>,
    /// Raw block manifests
    #[serde(default)]
    pub blocks: Vec<Value>,
    /// Raw handle manifests
    #[serde(default)]
    pub handles: Vec<Value>,
}

impl IpamPayload {
    /// Parse the IPAM segment. A blank segment is an empty payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MigrateError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes).map_err(|e| MigrateError::IpamPayload(e.to_string()))
    }

    /// Number of items across all collections.
    pub fn len(&self) -> usize {
        self.ip_pools.len() + self.blocks.len() + self.handles.len()
    }

    /// Whether there is nothing to import.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Moves IPAM state in and out of a datastore
pub struct MigrateIpam<'a, C: DatastoreClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: DatastoreClient + ?Sized> MigrateIpam<'a, C> {
    /// Create a transfer over `client`
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    async fn list_typed<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<T>, StoreError> {
        let objects = self.client.list(kind, &NamespaceScope::Cluster).await?;
        let mut typed = Vec::with_capacity(objects.len());
        for obj in objects {
            typed.push(from_dynamic(obj)?);
        }
        Ok(typed)
    }

    /// Read the full IPAM state.
    pub async fn pull(&self) -> Result<IpamSnapshot, StoreError> {
        let snapshot = IpamSnapshot {
            ip_pools: self.list_typed(ResourceKind::IpPool).await?,
            blocks: self.list_typed(ResourceKind::IpamBlock).await?,
            handles: self.list_typed(ResourceKind::IpamHandle).await?,
        };
        debug!(
            pools = snapshot.ip_pools.len(),
            blocks = snapshot.blocks.len(),
            handles = snapshot.handles.len(),
            "pulled IPAM state"
        );
        Ok(snapshot)
    }

    /// Write a payload: pools, then blocks with their affinities, then
    /// handles. Each item is upserted.
    ///
    /// A block must lie inside a pool and a handle may only name blocks, where
    /// pools and blocks already in the destination count alongside the
    /// payload's own.
    pub async fn push(&self, payload: &IpamPayload) -> ApplyResult {
        let engine = ResourceEngine::new(self.client);
        let mut result = ApplyResult::default();

        let mut pushed_pools = Vec::new();
        for (i, raw) in payload.ip_pools.iter().enumerate() {
            let outcome = match decode::<IpPool>(ResourceKind::IpPool, "ipPools", i, raw) {
                Ok(pool) => self.push_pool(&engine, pool).await,
                Err(err) => Err(err),
            };
            let outcome = outcome.map(|cidr| pushed_pools.push(cidr));
            record(&mut result, ResourceKind::IpPool, outcome);
        }

        let pools = self.known_cidrs(ResourceKind::IpPool, pushed_pools).await;
        let mut pushed_blocks = Vec::new();
        for (i, raw) in payload.blocks.iter().enumerate() {
            let outcome = match decode::<IpamBlock>(ResourceKind::IpamBlock, "blocks", i, raw) {
                Ok(block) => self.push_block(&engine, block, &pools).await,
                Err(err) => Err(err),
            };
            let outcome = outcome.map(|cidr| pushed_blocks.push(cidr));
            record(&mut result, ResourceKind::IpamBlock, outcome);
        }

        let blocks: HashSet<Cidr> = self
            .known_cidrs(ResourceKind::IpamBlock, pushed_blocks)
            .await
            .into_iter()
            .collect();
        for (i, raw) in payload.handles.iter().enumerate() {
            let outcome = match decode::<IpamHandle>(ResourceKind::IpamHandle, "handles", i, raw) {
                Ok(handle) => self.push_handle(&engine, handle, &blocks).await,
                Err(err) => Err(err),
            };
            record(&mut result, ResourceKind::IpamHandle, outcome);
        }

        info!(
            handled = result.num_handled,
            total = result.num_resources,
            "IPAM push finished"
        );
        result
    }

    /// CIDRs written by this push plus those the destination already holds.
    /// A failed listing leaves only the pushed ones.
    async fn known_cidrs(&self, kind: ResourceKind, mut cidrs: Vec<Cidr>) -> Vec<Cidr> {
        match self.client.list(kind, &NamespaceScope::Cluster).await {
            Ok(objects) => cidrs.extend(objects.iter().filter_map(|obj| {
                obj.data
                    .get("spec")
                    .and_then(|spec| spec.get("cidr"))
                    .and_then(Value::as_str)
                    .and_then(|cidr| cidr.parse::<Cidr>().ok())
            })),
            Err(e) => warn!(kind = %kind, error = %e, "could not list existing IPAM state"),
        }
        cidrs
    }

    async fn push_pool(
        &self,
        engine: &ResourceEngine<'_, C>,
        mut pool: IpPool,
    ) -> Result<Cidr, ResourceError> {
        let label = describe(ResourceKind::IpPool, &pool.name_any(), None);
        let cidr =
            validate_pool(&pool.spec).map_err(|msg| ResourceError::new(label.clone(), msg))?;
        reset_metadata(&mut pool.metadata);
        upsert(engine, ResourceKind::IpPool, &pool, &label).await?;
        Ok(cidr)
    }

    async fn push_block(
        &self,
        engine: &ResourceEngine<'_, C>,
        mut block: IpamBlock,
        pools: &[Cidr],
    ) -> Result<Cidr, ResourceError> {
        let label = describe(ResourceKind::IpamBlock, &block.name_any(), None);
        let cidr = validate_block(&block.spec, pools)
            .map_err(|msg| ResourceError::new(label.clone(), msg))?;
        reset_metadata(&mut block.metadata);
        upsert(engine, ResourceKind::IpamBlock, &block, &label).await?;

        if let Some(host) = block.spec.affinity_host() {
            let affinity = BlockAffinity::confirmed(host, &cidr);
            let affinity_label = describe(ResourceKind::BlockAffinity, &affinity.name_any(), None);
            upsert(engine, ResourceKind::BlockAffinity, &affinity, &affinity_label)
                .await
                .map_err(|e| {
                    ResourceError::new(label, format!("affinity for {}: {}", host, e.message))
                })?;
        }
        Ok(cidr)
    }

    async fn push_handle(
        &self,
        engine: &ResourceEngine<'_, C>,
        mut handle: IpamHandle,
        blocks: &HashSet<Cidr>,
    ) -> Result<(), ResourceError> {
        let label = describe(ResourceKind::IpamHandle, &handle.name_any(), None);
        validate_handle(&handle.spec, blocks)
            .map_err(|msg| ResourceError::new(label.clone(), msg))?;
        reset_metadata(&mut handle.metadata);
        upsert(engine, ResourceKind::IpamHandle, &handle, &label).await
    }
}

fn record(result: &mut ApplyResult, kind: ResourceKind, outcome: Result<(), ResourceError>) {
    match outcome {
        Ok(()) => result.record_success(kind.kind_str()),
        Err(err) => {
            warn!(resource = %err.target, error = %err.message, "skipped IPAM resource");
            result.record_failure(Some(kind.kind_str()), err);
        }
    }
}

fn decode<T: DeserializeOwned>(
    kind: ResourceKind,
    collection: &str,
    index: usize,
    raw: &Value,
) -> Result<T, ResourceError> {
    let name = raw
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty());
    let label = match name {
        Some(name) => describe(kind, name, None),
        None => {
            return Err(ResourceError::new(
                format!("{}[{}]", collection, index),
                "missing metadata.name",
            ))
        }
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| ResourceError::new(label, format!("malformed: {}", e)))
}

fn reset_metadata(meta: &mut ObjectMeta) {
    strip_transient_fields(meta);
    meta.namespace = None;
}

async fn upsert<C, T>(
    engine: &ResourceEngine<'_, C>,
    kind: ResourceKind,
    resource: &T,
    label: &str,
) -> Result<(), ResourceError>
where
    C: DatastoreClient + ?Sized,
    T: Serialize,
{
    let obj = to_dynamic(resource).map_err(|e| ResourceError::new(label, e.to_string()))?;
    engine
        .write(kind, obj, ApplyIntent::Apply)
        .await
        .map(|_| debug!(resource = %label, "imported"))
        .map_err(|e| ResourceError::new(label, e.to_string()))
}

fn parse_cidr(cidr: &str) -> Result<Cidr, String> {
    cidr.parse::<Cidr>().map_err(|e| e.to_string())
}

/// Check a pool's CIDR and block size. Returns the parsed pool CIDR.
fn validate_pool(spec: &IpPoolSpec) -> Result<Cidr, String> {
    let cidr = parse_cidr(&spec.cidr)?;
    if !cidr.is_aligned() {
        return Err(format!("pool CIDR {} has host bits set", cidr));
    }
    let block_size = spec.effective_block_size(&cidr);
    let min = if cidr.is_ipv4() {
        MIN_V4_BLOCK_SIZE
    } else {
        MIN_V6_BLOCK_SIZE
    };
    if block_size < min || block_size > cidr.max_prefix() {
        return Err(format!(
            "block size {} out of range {}-{}",
            block_size,
            min,
            cidr.max_prefix()
        ));
    }
    if block_size < cidr.prefix_len() {
        return Err(format!(
            "block size {} is larger than the pool {}",
            block_size, cidr
        ));
    }
    Ok(cidr)
}

/// Check a block's placement and allocation map. Returns the parsed block
/// CIDR.
fn validate_block(spec: &IpamBlockSpec, pools: &[Cidr]) -> Result<Cidr, String> {
    let cidr = parse_cidr(&spec.cidr)?;
    if !cidr.is_aligned() {
        return Err(format!("block CIDR {} has host bits set", cidr));
    }
    if !pools.iter().any(|pool| pool.contains_cidr(&cidr)) {
        return Err(format!("block {} is not inside any IP pool", cidr));
    }
    if spec.allocations.len() as u128 != cidr.size() {
        return Err(format!(
            "{} allocation slots for a block of {} addresses",
            spec.allocations.len(),
            cidr.size()
        ));
    }
    for (ordinal, slot) in spec.allocations.iter().enumerate() {
        if let Some(attr) = slot {
            if *attr < 0 || *attr as usize >= spec.attributes.len() {
                return Err(format!(
                    "allocation {} references missing attribute {}",
                    ordinal, attr
                ));
            }
        }
    }
    let mut seen = HashSet::new();
    for ordinal in &spec.unallocated {
        let slot = usize::try_from(*ordinal)
            .ok()
            .and_then(|i| spec.allocations.get(i))
            .ok_or_else(|| format!("unallocated ordinal {} out of range", ordinal))?;
        if slot.is_some() {
            return Err(format!("ordinal {} is both allocated and free", ordinal));
        }
        if !seen.insert(*ordinal) {
            return Err(format!("ordinal {} listed as free twice", ordinal));
        }
    }
    Ok(cidr)
}

fn validate_handle(spec: &IpamHandleSpec, blocks: &HashSet<Cidr>) -> Result<(), String> {
    if spec.handle_id.is_empty() {
        return Err("empty handleID".to_string());
    }
    for (block, count) in &spec.block {
        if !blocks.contains(&parse_cidr(block)?) {
            return Err(format!("handle references unknown block {}", block));
        }
        if *count <= 0 {
            return Err(format!("non-positive count {} for block {}", count, block));
        }
    }
    Ok(())
}
