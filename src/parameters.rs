//! Parameters handed to image families when building a launch template
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::apis::{ARCHITECTURE_AMD64, ARCHITECTURE_ARM64};

/// The CPU architecture of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// x86-64
    Amd64,
    /// 64-bit ARM
    Arm64,
}

impl Arch {
    /// The architecture as spelled in the `kubernetes.io/arch` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => ARCHITECTURE_AMD64,
            Arch::Arm64 => ARCHITECTURE_ARM64,
        }
    }
}

impl Default for Arch {
    fn default() -> Self {
        Arch::Amd64
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that do not depend on which image family is chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticParameters {
    /// The name of the cluster
    pub cluster_name: String,
    /// The URL of the cluster's API server
    pub cluster_endpoint: String,
    /// Tags declared on the node class
    pub tags: BTreeMap<String, String>,
    /// Labels the node registers with
    pub labels: BTreeMap<String, String>,
    /// CA bundle the node should trust, if any
    pub ca_bundle: Option<String>,
    /// The node's CPU architecture
    pub arch: Arch,
    /// Whether the instance type has an NVIDIA GPU
    pub gpu_node: bool,
    /// The GPU driver version for the instance type
    pub gpu_driver_version: String,
    /// The digest of the GPU driver image for the instance type
    pub gpu_image_sha: String,
    /// AAD tenant ID
    pub tenant_id: String,
    /// Subscription the node is created in
    pub subscription_id: String,
    /// Client ID of the identity assigned to the node
    pub user_assigned_identity_id: String,
    /// The node resource group
    pub resource_group: String,
    /// Azure region
    pub location: String,
    /// A short identifier of the cluster
    pub cluster_id: String,
    /// Host name of the API server
    pub api_server_name: String,
    /// Token used by the kubelet for TLS bootstrapping
    pub kubelet_client_tls_bootstrap_token: String,
    /// The cluster's network plugin
    pub network_plugin: String,
    /// The cluster's network policy engine
    pub network_policy: String,
    /// Kubernetes version of the cluster. Empty until looked up.
    pub kubernetes_version: String,
}

/// Renders the script a node runs on first boot.
pub trait Bootstrapper {
    /// Produces the user data script.
    fn script(&self) -> anyhow::Result<String>;
}

/// Everything needed to launch a node from a particular image.
pub struct Parameters {
    /// The image-independent parameters the image family was resolved from
    pub static_parameters: StaticParameters,
    /// Renders the boot script for the image
    pub user_data: Box<dyn Bootstrapper + Send + Sync>,
    /// The image to boot
    pub image_id: String,
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("static_parameters", &self.static_parameters)
            .field("image_id", &self.image_id)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arch_uses_kubernetes_spelling() {
        assert_eq!(Arch::default(), Arch::Amd64);
        assert_eq!(Arch::Arm64.to_string(), "arm64");
        assert_eq!(serde_json::to_string(&Arch::Amd64).unwrap(), "\"amd64\"");
        assert_eq!(serde_json::from_str::<Arch>("\"arm64\"").unwrap(), Arch::Arm64);
    }
}
