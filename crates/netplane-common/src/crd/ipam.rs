//! IPAM Custom Resource Definitions
//!
//! Pools carve address space into fixed-size blocks. A block records, per
//! address, which attribute entry (if any) owns it; attributes name the
//! allocation handle and carry free-form secondary data. Handles count how
//! many addresses they hold in each block so an owner can release them in
//! one call. A block claimed by a node also has a matching BlockAffinity.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::net::Cidr;

/// Prefix of a block's `affinity` field when it is claimed by a node
pub const HOST_AFFINITY_PREFIX: &str = "host:";

/// Default block size for IPv4 pools
pub const DEFAULT_V4_BLOCK_SIZE: u8 = 26;
/// Default block size for IPv6 pools
pub const DEFAULT_V6_BLOCK_SIZE: u8 = 122;

/// Encapsulation mode for traffic leaving a pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EncapsulationMode {
    /// No encapsulation
    #[default]
    Never,
    /// Always encapsulate
    Always,
    /// Encapsulate only across subnet boundaries
    CrossSubnet,
}

/// Specification for an IPPool
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.netplane.dev",
    version = "v1",
    kind = "IPPool",
    root = "IpPool",
    plural = "ippools",
    printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".spec.cidr"}"#,
    printcolumn = r#"{"name":"Block","type":"integer","jsonPath":".spec.blockSize"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpPoolSpec {
    /// Address range of the pool
    pub cidr: String,

    /// Prefix length of the blocks carved from this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u8>,

    /// IP-in-IP encapsulation mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipip_mode: Option<EncapsulationMode>,

    /// VXLAN encapsulation mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan_mode: Option<EncapsulationMode>,

    /// Masquerade traffic leaving the pool
    #[serde(default)]
    pub nat_outgoing: bool,

    /// Stop allocating from this pool
    #[serde(default)]
    pub disabled: bool,

    /// Selects the nodes that may allocate from this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<String>,
}

impl IpPoolSpec {
    /// Block size, falling back to the family default.
    pub fn effective_block_size(&self, cidr: &Cidr) -> u8 {
        self.block_size.unwrap_or(if cidr.is_ipv4() {
            DEFAULT_V4_BLOCK_SIZE
        } else {
            DEFAULT_V6_BLOCK_SIZE
        })
    }
}

/// Attribute entry referenced from a block's allocation slots
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AllocationAttribute {
    /// Handle that owns the allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<String>,

    /// Free-form data set by the allocator (pod, namespace, node...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary: BTreeMap<String, String>,
}

/// Specification for an IPAMBlock
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.netplane.dev",
    version = "v1",
    kind = "IPAMBlock",
    root = "IpamBlock",
    plural = "ipamblocks",
    printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".spec.cidr"}"#,
    printcolumn = r#"{"name":"Affinity","type":"string","jsonPath":".spec.affinity"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpamBlockSpec {
    /// Address range covered by the block
    pub cidr: String,

    /// Owner claim, `host:<node>` for node-affine blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<String>,

    /// Only the affine host may allocate from this block
    #[serde(default)]
    pub strict_affinity: bool,

    /// One slot per address: index into `attributes`, or null when free
    #[serde(default)]
    pub allocations: Vec<Option<i64>>,

    /// Ordinals of free addresses, in allocation order
    #[serde(default)]
    pub unallocated: Vec<i64>,

    /// Attribute entries referenced by `allocations`
    #[serde(default)]
    pub attributes: Vec<AllocationAttribute>,

    /// Block is being torn down
    #[serde(default)]
    pub deleted: bool,
}

impl IpamBlockSpec {
    /// Node that holds affinity for this block, if any.
    pub fn affinity_host(&self) -> Option<&str> {
        self.affinity
            .as_deref()
            .and_then(|a| a.strip_prefix(HOST_AFFINITY_PREFIX))
            .filter(|host| !host.is_empty())
    }
}

/// Specification for a BlockAffinity
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.netplane.dev",
    version = "v1",
    kind = "BlockAffinity",
    plural = "blockaffinities",
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".spec.cidr"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".spec.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BlockAffinitySpec {
    /// Node holding the claim
    pub host: String,

    /// Block claimed
    pub cidr: String,

    /// Claim state
    #[serde(default)]
    pub state: AffinityState,

    /// Claim is being released
    #[serde(default)]
    pub deleted: bool,
}

/// Lifecycle of a block affinity claim
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AffinityState {
    /// Claim written but the block may not exist yet
    Pending,
    /// Block exists and is affine to the host
    #[default]
    Confirmed,
    /// Claim is being released
    PendingDeletion,
}

impl BlockAffinity {
    /// Affinity object name for a host and block, e.g. `node-1-10-0-0-0-26`.
    pub fn name_for(host: &str, block: &Cidr) -> String {
        format!("{}-{}", host, block.resource_name())
    }

    /// Confirmed affinity of `host` over `block`.
    pub fn confirmed(host: &str, block: &Cidr) -> Self {
        Self::new(
            &Self::name_for(host, block),
            BlockAffinitySpec {
                host: host.to_string(),
                cidr: block.to_string(),
                state: AffinityState::Confirmed,
                deleted: false,
            },
        )
    }
}

/// Specification for an IPAMHandle
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.netplane.dev",
    version = "v1",
    kind = "IPAMHandle",
    root = "IpamHandle",
    plural = "ipamhandles",
    printcolumn = r#"{"name":"Handle","type":"string","jsonPath":".spec.handleID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpamHandleSpec {
    /// Allocation handle identifier
    #[serde(rename = "handleID")]
    pub handle_id: String,

    /// Addresses held per block CIDR
    #[serde(default)]
    pub block: BTreeMap<String, i64>,

    /// Handle is being released
    #[serde(default)]
    pub deleted: bool,
}

impl IpamHandleSpec {
    /// Total addresses held across blocks.
    pub fn total(&self) -> i64 {
        self.block.values().sum()
    }
}
