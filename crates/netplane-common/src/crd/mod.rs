//! Custom Resource Definitions for netplane
//!
//! ClusterInformation and the IPAM kinds are typed, since netplane reads and
//! writes their fields. Every other kind gets a structural CRD that keeps its
//! spec opaque.

mod cluster_info;
mod ipam;
mod opaque;

pub use cluster_info::{ClusterInformation, ClusterInformationSpec};
pub use ipam::{
    AffinityState, AllocationAttribute, BlockAffinity, BlockAffinitySpec, EncapsulationMode,
    IpPool, IpPoolSpec, IpamBlock, IpamBlockSpec, IpamHandle, IpamHandleSpec,
    DEFAULT_V4_BLOCK_SIZE, DEFAULT_V6_BLOCK_SIZE, HOST_AFFINITY_PREFIX,
};
pub use opaque::opaque_definition;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

use crate::kinds::ResourceKind;
use crate::Error;

/// The CRD backing `kind`, or `None` for inventory-backed kinds.
pub fn definition_for(kind: ResourceKind) -> Result<Option<CustomResourceDefinition>, Error> {
    let crd = match kind {
        ResourceKind::Node => return Ok(None),
        ResourceKind::ClusterInformation => ClusterInformation::crd(),
        ResourceKind::IpPool => IpPool::crd(),
        ResourceKind::IpamBlock => IpamBlock::crd(),
        ResourceKind::BlockAffinity => BlockAffinity::crd(),
        ResourceKind::IpamHandle => IpamHandle::crd(),
        other => opaque_definition(other)?,
    };
    Ok(Some(crd))
}
