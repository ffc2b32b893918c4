//! Node labels describing the virtual network a node is attached to.
//!
//! The overlay dataplane routes pod traffic using these labels, so every label
//! is produced or none is.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::{NetworkSettings, VnetLabelMode};
use crate::error::ConfigurationError;

/// The network dataplane of the node.
pub const VNET_DATAPLANE_LABEL: &str = "kubernetes.azure.com/ebpf-dataplane";
/// The virtual network the node's subnet belongs to.
pub const VNET_NETWORK_NAME_LABEL: &str = "kubernetes.azure.com/network-name";
/// The subnet the node is attached to.
pub const VNET_SUBNET_NAME_LABEL: &str = "kubernetes.azure.com/network-subnet";
/// The subscription holding the virtual network.
pub const VNET_SUBSCRIPTION_ID_LABEL: &str = "kubernetes.azure.com/network-subscription";
/// The GUID of the virtual network.
pub const VNET_GUID_LABEL: &str = "kubernetes.azure.com/nodenetwork-vnetguid";
/// How pods get their addresses.
pub const VNET_POD_NETWORK_TYPE_LABEL: &str = "kubernetes.azure.com/podnetwork-type";

const CILIUM_DATAPLANE: &str = "cilium";
const OVERLAY_NETWORK_TYPE: &str = "overlay";

// subscriptions/{sub} requires at least three segments once split on '/'
const MIN_SEGMENTS: usize = 3;

/// The parts of a subnet resource ID that name its network topology.
///
/// # Examples
///
/// ```
/// use launchtemplate::vnet::SubnetId;
///
/// let id: SubnetId = "/subscriptions/sub1/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1"
///     .parse()
///     .unwrap();
///
/// assert_eq!("sub1", id.subscription_id());
/// assert_eq!("vnet1", id.vnet_name());
/// assert_eq!("subnet1", id.subnet_name());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubnetId {
    whole: String,
    subscription_id: String,
    vnet_name: String,
    subnet_name: String,
}

impl SubnetId {
    /// The subscription ID, taken from the third path segment.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The virtual network name, taken from the third segment from the end.
    pub fn vnet_name(&self) -> &str {
        &self.vnet_name
    }

    /// The subnet name, taken from the last segment.
    pub fn subnet_name(&self) -> &str {
        &self.subnet_name
    }

    /// The full resource ID.
    pub fn whole(&self) -> &str {
        &self.whole
    }
}

impl fmt::Display for SubnetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.whole)
    }
}

impl FromStr for SubnetId {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() < MIN_SEGMENTS {
            return Err(ConfigurationError::MalformedSubnetId {
                subnet_id: s.to_owned(),
            });
        }
        Ok(SubnetId {
            whole: s.to_owned(),
            subscription_id: parts[2].to_owned(),
            vnet_name: parts[parts.len() - 3].to_owned(),
            subnet_name: parts[parts.len() - 1].to_owned(),
        })
    }
}

impl TryFrom<&str> for SubnetId {
    type Error = ConfigurationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// The virtual network labels for a subnet in an overlay network.
pub fn vnet_labels(subnet_id: &SubnetId, vnet_guid: &str) -> BTreeMap<String, String> {
    vec![
        (VNET_DATAPLANE_LABEL, CILIUM_DATAPLANE),
        (VNET_NETWORK_NAME_LABEL, subnet_id.vnet_name()),
        (VNET_SUBNET_NAME_LABEL, subnet_id.subnet_name()),
        (VNET_SUBSCRIPTION_ID_LABEL, subnet_id.subscription_id()),
        (VNET_GUID_LABEL, vnet_guid),
        (VNET_POD_NETWORK_TYPE_LABEL, OVERLAY_NETWORK_TYPE),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

/// Resolves the virtual network labels for a node.
///
/// The node class subnet wins over the cluster default in `network`. Returns
/// no labels when `network` disables them.
pub fn resolve_vnet_labels(
    node_class_subnet_id: Option<&str>,
    network: &NetworkSettings,
) -> Result<BTreeMap<String, String>, ConfigurationError> {
    match network.label_mode {
        VnetLabelMode::Disabled => Ok(BTreeMap::new()),
        VnetLabelMode::CiliumOverlay => {
            let subnet_id: SubnetId = node_class_subnet_id
                .or_else(|| network.subnet_id.as_deref())
                .ok_or(ConfigurationError::MissingSubnetId)?
                .parse()?;
            Ok(vnet_labels(&subnet_id, &network.vnet_guid))
        }
    }
}
