//! The objects a launch template is built from: the node class, the node claim
//! being provisioned and the instance type chosen for it.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::NodeSelectorRequirement;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use scheduling::Requirements;
use serde::{Deserialize, Serialize};

/// The well-known node label holding the CPU architecture.
pub const LABEL_ARCH_STABLE: &str = "kubernetes.io/arch";
/// Architecture value for x86-64 nodes.
pub const ARCHITECTURE_AMD64: &str = "amd64";
/// Architecture value for 64-bit ARM nodes.
pub const ARCHITECTURE_ARM64: &str = "arm64";

/// Azure-specific settings shared by every node provisioned from it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AksNodeClass {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The node class settings
    #[serde(default)]
    pub spec: AksNodeClassSpec,
}

/// The settings of an [`AksNodeClass`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AksNodeClassSpec {
    /// Resource ID of the subnet nodes are attached to. When unset, the
    /// cluster's default subnet is used.
    #[serde(
        rename = "vnetSubnetID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub vnet_subnet_id: Option<String>,
    /// Size of the OS disk in GB
    #[serde(
        rename = "osDiskSizeGB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub os_disk_size_gb: Option<i32>,
    /// The image family to boot nodes from, e.g. `Ubuntu2204` or `AzureLinux`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_family: Option<String>,
    /// Tags applied to every Azure resource created for a node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A request for a single node.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeClaim {
    /// Standard object metadata. Its labels are carried onto the node.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// What the node must satisfy
    #[serde(default)]
    pub spec: NodeClaimSpec,
}

/// The scheduling constraints of a [`NodeClaim`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeClaimSpec {
    /// Node selector requirements the launched node must meet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<NodeSelectorRequirement>,
}

impl NodeClaim {
    /// The name of the claim, or an empty string if it has none yet.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The labels of the claim.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }
}

/// A VM size that can satisfy a node claim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceType {
    /// The SKU name, e.g. `Standard_D4s_v3`
    pub name: String,
    /// The label values nodes of this size advertise
    pub requirements: Requirements,
    /// Resources available on nodes of this size
    pub capacity: BTreeMap<String, Quantity>,
}

impl InstanceType {
    /// Creates an instance type with no capacity information.
    pub fn new(name: &str, requirements: Requirements) -> Self {
        InstanceType {
            name: name.to_owned(),
            requirements,
            capacity: BTreeMap::new(),
        }
    }
}
