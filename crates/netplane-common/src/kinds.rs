//! Registry of every resource kind netplane stores
//!
//! Each kind knows its public (v3) name, its CRD plural and scope, and how to
//! build the `ApiResource` used to reach it through a dynamic kube API. Node
//! is the exception: it is backed by the cluster's host inventory rather than
//! a netplane CRD.

use kube::discovery::ApiResource;

use crate::kube_utils::build_api_resource;
use crate::{CRD_GROUP, CRD_VERSION};

/// Resource kinds known to netplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// BGPConfiguration
    BgpConfiguration,
    /// BGPPeer
    BgpPeer,
    /// FelixConfiguration
    FelixConfiguration,
    /// GlobalNetworkPolicy
    GlobalNetworkPolicy,
    /// GlobalNetworkSet
    GlobalNetworkSet,
    /// HostEndpoint
    HostEndpoint,
    /// IPPool
    IpPool,
    /// KubeControllersConfiguration
    KubeControllersConfiguration,
    /// NetworkPolicy (namespaced)
    NetworkPolicy,
    /// NetworkSet (namespaced)
    NetworkSet,
    /// Node (backed by the host inventory)
    Node,
    /// ClusterInformation singleton
    ClusterInformation,
    /// IPAMBlock (IPAM internal)
    IpamBlock,
    /// BlockAffinity (IPAM internal)
    BlockAffinity,
    /// IPAMHandle (IPAM internal)
    IpamHandle,
    /// IPAMConfig (IPAM internal)
    IpamConfig,
}

impl ResourceKind {
    /// Every kind, in schema installation order.
    pub const ALL: &'static [ResourceKind] = &[
        ResourceKind::BgpConfiguration,
        ResourceKind::BgpPeer,
        ResourceKind::FelixConfiguration,
        ResourceKind::GlobalNetworkPolicy,
        ResourceKind::GlobalNetworkSet,
        ResourceKind::HostEndpoint,
        ResourceKind::IpPool,
        ResourceKind::KubeControllersConfiguration,
        ResourceKind::NetworkPolicy,
        ResourceKind::NetworkSet,
        ResourceKind::Node,
        ResourceKind::ClusterInformation,
        ResourceKind::IpamBlock,
        ResourceKind::BlockAffinity,
        ResourceKind::IpamHandle,
        ResourceKind::IpamConfig,
    ];

    /// Kinds exposed through the public v3 API.
    pub const V3: &'static [ResourceKind] = &[
        ResourceKind::BgpConfiguration,
        ResourceKind::BgpPeer,
        ResourceKind::FelixConfiguration,
        ResourceKind::GlobalNetworkPolicy,
        ResourceKind::GlobalNetworkSet,
        ResourceKind::HostEndpoint,
        ResourceKind::IpPool,
        ResourceKind::KubeControllersConfiguration,
        ResourceKind::NetworkPolicy,
        ResourceKind::NetworkSet,
        ResourceKind::Node,
    ];

    /// Kind string as it appears in manifests.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::BgpConfiguration => "BGPConfiguration",
            Self::BgpPeer => "BGPPeer",
            Self::FelixConfiguration => "FelixConfiguration",
            Self::GlobalNetworkPolicy => "GlobalNetworkPolicy",
            Self::GlobalNetworkSet => "GlobalNetworkSet",
            Self::HostEndpoint => "HostEndpoint",
            Self::IpPool => "IPPool",
            Self::KubeControllersConfiguration => "KubeControllersConfiguration",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::NetworkSet => "NetworkSet",
            Self::Node => "Node",
            Self::ClusterInformation => "ClusterInformation",
            Self::IpamBlock => "IPAMBlock",
            Self::BlockAffinity => "BlockAffinity",
            Self::IpamHandle => "IPAMHandle",
            Self::IpamConfig => "IPAMConfig",
        }
    }

    /// Lowercase plural used in API paths and CRD names.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::BgpConfiguration => "bgpconfigurations",
            Self::BgpPeer => "bgppeers",
            Self::FelixConfiguration => "felixconfigurations",
            Self::GlobalNetworkPolicy => "globalnetworkpolicies",
            Self::GlobalNetworkSet => "globalnetworksets",
            Self::HostEndpoint => "hostendpoints",
            Self::IpPool => "ippools",
            Self::KubeControllersConfiguration => "kubecontrollersconfigurations",
            Self::NetworkPolicy => "networkpolicies",
            Self::NetworkSet => "networksets",
            Self::Node => "nodes",
            Self::ClusterInformation => "clusterinformations",
            Self::IpamBlock => "ipamblocks",
            Self::BlockAffinity => "blockaffinities",
            Self::IpamHandle => "ipamhandles",
            Self::IpamConfig => "ipamconfigs",
        }
    }

    /// Human-readable plural for operator messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BgpConfiguration => "BGP configurations",
            Self::BgpPeer => "BGP peers",
            Self::FelixConfiguration => "Felix configurations",
            Self::GlobalNetworkPolicy => "global network policies",
            Self::GlobalNetworkSet => "global network sets",
            Self::HostEndpoint => "host endpoints",
            Self::IpPool => "IP pools",
            Self::KubeControllersConfiguration => "kube-controllers configurations",
            Self::NetworkPolicy => "network policies",
            Self::NetworkSet => "network sets",
            Self::Node => "nodes",
            Self::ClusterInformation => "cluster information",
            Self::IpamBlock => "IPAM blocks",
            Self::BlockAffinity => "block affinities",
            Self::IpamHandle => "IPAM handles",
            Self::IpamConfig => "IPAM configurations",
        }
    }

    /// Whether instances live in a namespace.
    pub fn namespaced(&self) -> bool {
        matches!(self, Self::NetworkPolicy | Self::NetworkSet)
    }

    /// Whether instances come from the host inventory instead of a CRD.
    pub fn inventory_backed(&self) -> bool {
        matches!(self, Self::Node)
    }

    /// Whether operators may create or replace the kind from a manifest file.
    ///
    /// ClusterInformation is owned by the lock manager and import merge, and
    /// Node by the host inventory.
    pub fn applicable(&self) -> bool {
        Self::V3.contains(self) && !self.inventory_backed()
    }

    /// Name of the backing CRD, `None` for inventory-backed kinds.
    pub fn crd_name(&self) -> Option<String> {
        if self.inventory_backed() {
            return None;
        }
        Some(format!("{}.{}", self.plural(), CRD_GROUP))
    }

    /// ApiResource for the stored form of this kind.
    pub fn api_resource(&self) -> ApiResource {
        if self.inventory_backed() {
            return build_api_resource("v1", self.kind_str());
        }
        ApiResource {
            group: CRD_GROUP.to_string(),
            version: CRD_VERSION.to_string(),
            api_version: format!("{}/{}", CRD_GROUP, CRD_VERSION),
            kind: self.kind_str().to_string(),
            plural: self.plural().to_string(),
        }
    }

    /// Resolve a manifest kind, case-insensitively, from its kind or plural.
    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| {
            k.kind_str().eq_ignore_ascii_case(kind) || k.plural().eq_ignore_ascii_case(kind)
        })
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_str())
    }
}
