//! Configuration for the launch template provider
//!
//! Everything the provider needs from its surroundings is captured once, when
//! the provider is built: cluster-wide [`Options`], the Azure identity the
//! controller runs with ([`AzureConfig`]) and the network facts of the node
//! resource group ([`NetworkSettings`]). Nothing is read from the process
//! environment while a template is being built.
//!
//! Use [`Options::from_env`] or, with the "cli" feature turned on,
//! [`Options::new_from_flags`].

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use structopt::StructOpt;

use crate::error::ConfigurationError;

const CLUSTER_NAME: &str = "CLUSTER_NAME";
const CLUSTER_ENDPOINT: &str = "CLUSTER_ENDPOINT";
const CLUSTER_ID: &str = "CLUSTER_ID";
const KUBELET_BOOTSTRAP_TOKEN: &str = "KUBELET_BOOTSTRAP_TOKEN";
const NETWORK_PLUGIN: &str = "NETWORK_PLUGIN";
const NETWORK_POLICY: &str = "NETWORK_POLICY";
const AZURE_SUBNET_ID: &str = "AZURE_SUBNET_ID";
const AZURE_VNET_GUID: &str = "AZURE_VNET_GUID";

const DEFAULT_NETWORK_PLUGIN: &str = "azure";

/// A source of environment-style key/value settings.
pub trait Environment {
    /// The value for `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the running process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Cluster-wide settings of the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// The name of the AKS cluster
    pub cluster_name: String,
    /// The URL of the cluster's API server
    pub cluster_endpoint: String,
    /// A short identifier of the cluster used by node bootstrapping
    pub cluster_id: String,
    /// The token kubelets use for TLS bootstrapping
    pub kubelet_client_tls_bootstrap_token: String,
    /// The network plugin of the cluster, e.g. `azure` or `kubenet`
    pub network_plugin: String,
    /// The network policy engine of the cluster, if any
    pub network_policy: String,
}

impl Options {
    /// Builds options from environment variables.
    ///
    /// `CLUSTER_NAME`, `CLUSTER_ENDPOINT` and `KUBELET_BOOTSTRAP_TOKEN` are
    /// required. `CLUSTER_ID` is derived from the API server name when unset.
    pub fn from_env<E: Environment>(env: &E) -> Result<Self, ConfigurationError> {
        let required = |name: &'static str| {
            env.var(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigurationError::MissingOption { name })
        };
        let cluster_endpoint = required(CLUSTER_ENDPOINT)?;
        let cluster_id = match env.var(CLUSTER_ID).filter(|v| !v.is_empty()) {
            Some(id) => id,
            None => cluster_id_for(&api_server_name(&cluster_endpoint)?),
        };
        let options = Options {
            cluster_name: required(CLUSTER_NAME)?,
            cluster_endpoint,
            cluster_id,
            kubelet_client_tls_bootstrap_token: required(KUBELET_BOOTSTRAP_TOKEN)?,
            network_plugin: env
                .var(NETWORK_PLUGIN)
                .unwrap_or_else(|| DEFAULT_NETWORK_PLUGIN.to_owned()),
            network_policy: env.var(NETWORK_POLICY).unwrap_or_default(),
        };
        options.validate()?;
        Ok(options)
    }

    /// Checks that required fields are set and the endpoint is usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cluster_name.is_empty() {
            return Err(ConfigurationError::MissingOption { name: CLUSTER_NAME });
        }
        if self.kubelet_client_tls_bootstrap_token.is_empty() {
            return Err(ConfigurationError::MissingOption {
                name: KUBELET_BOOTSTRAP_TOKEN,
            });
        }
        api_server_name(&self.cluster_endpoint).map(|_| ())
    }

    /// The host name of the cluster's API server.
    ///
    /// Returns an empty string if the endpoint is not a valid URL; use
    /// [`Options::validate`] to reject such options up front.
    pub fn api_server_name(&self) -> String {
        api_server_name(&self.cluster_endpoint).unwrap_or_default()
    }

    /// Parses all command line flags and sets the proper defaults. The version
    /// of your application should be passed to set the proper version for the CLI
    #[cfg(any(feature = "cli", feature = "docs"))]
    #[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
    pub fn new_from_flags(version: &str) -> Result<Self, ConfigurationError> {
        let app = Opts::clap().version(version);
        let opts = Opts::from_clap(&app.get_matches());

        let cluster_id = match opts.cluster_id {
            Some(id) => id,
            None => cluster_id_for(&api_server_name(&opts.cluster_endpoint)?),
        };
        let options = Options {
            cluster_name: opts.cluster_name,
            cluster_endpoint: opts.cluster_endpoint,
            cluster_id,
            kubelet_client_tls_bootstrap_token: opts.kubelet_bootstrap_token,
            network_plugin: opts.network_plugin,
            network_policy: opts.network_policy.unwrap_or_default(),
        };
        options.validate()?;
        Ok(options)
    }
}

/// CLI options that can be configured for the launch template provider
///
/// These can be parsed from args using `Opts::from_args()`
#[derive(StructOpt, Clone, Debug)]
#[cfg(any(feature = "cli", feature = "docs"))]
#[cfg_attr(feature = "docs", doc(cfg(feature = "cli")))]
#[structopt(
    name = "launchtemplate",
    about = "Launch template settings for provisioning AKS nodes"
)]
pub struct Opts {
    #[structopt(long = "cluster-name", env = CLUSTER_NAME, help = "The name of the AKS cluster")]
    cluster_name: String,

    #[structopt(
        long = "cluster-endpoint",
        env = CLUSTER_ENDPOINT,
        help = "The URL of the cluster's API server, e.g. https://mycluster-dns-1234.hcp.westus2.azmk8s.io:443"
    )]
    cluster_endpoint: String,

    #[structopt(
        long = "cluster-id",
        env = CLUSTER_ID,
        help = "Short cluster identifier. Defaults to one derived from the API server name"
    )]
    cluster_id: Option<String>,

    #[structopt(
        long = "kubelet-bootstrap-token",
        env = KUBELET_BOOTSTRAP_TOKEN,
        hide_env_values = true,
        help = "The bootstrap token kubelets use to join the cluster"
    )]
    kubelet_bootstrap_token: String,

    #[structopt(
        long = "network-plugin",
        env = NETWORK_PLUGIN,
        default_value = DEFAULT_NETWORK_PLUGIN,
        help = "The network plugin of the cluster"
    )]
    network_plugin: String,

    #[structopt(
        long = "network-policy",
        env = NETWORK_POLICY,
        help = "The network policy engine of the cluster"
    )]
    network_policy: Option<String>,
}

/// The identity and placement of the controller in Azure.
///
/// This follows the layout of `/etc/kubernetes/azure.json`; fields the
/// provider does not use are ignored.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AzureConfig {
    /// AAD tenant ID
    #[serde(rename = "tenantId", default)]
    pub tenant_id: String,
    /// Subscription nodes are created in
    #[serde(rename = "subscriptionId", default)]
    pub subscription_id: String,
    /// Client ID of the user assigned identity given to nodes
    #[serde(rename = "userAssignedIdentityID", default)]
    pub user_assigned_identity_id: String,
    /// The node resource group
    #[serde(rename = "resourceGroup", default)]
    pub resource_group: String,
    /// Azure region
    #[serde(rename = "location", default)]
    pub location: String,
}

impl AzureConfig {
    /// Reads the configuration from JSON.
    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads the configuration from a JSON file such as `/etc/kubernetes/azure.json`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("unable to open {}: {}", path.display(), e))?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

/// Which virtual network labels nodes receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VnetLabelMode {
    /// Azure CNI overlay with the Cilium dataplane. Nodes are labeled with
    /// their subscription, virtual network, subnet and VNet GUID.
    CiliumOverlay,
    /// No virtual network labels are added.
    Disabled,
}

impl VnetLabelMode {
    /// The labeling mode that fits a cluster network plugin.
    pub fn for_network_plugin(plugin: &str) -> Self {
        match plugin {
            "azure" | "cilium" => VnetLabelMode::CiliumOverlay,
            _ => VnetLabelMode::Disabled,
        }
    }
}

impl Default for VnetLabelMode {
    fn default() -> Self {
        VnetLabelMode::CiliumOverlay
    }
}

/// Network facts of the cluster that apply when a node class does not
/// override them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    /// The default subnet resource ID for nodes
    pub subnet_id: Option<String>,
    /// The GUID of the cluster's virtual network. May be empty.
    pub vnet_guid: String,
    /// Which virtual network labels nodes receive
    pub label_mode: VnetLabelMode,
}

impl NetworkSettings {
    /// Captures `AZURE_SUBNET_ID` and `AZURE_VNET_GUID`, picking the label
    /// mode from the cluster's network plugin.
    pub fn from_env<E: Environment>(env: &E, network_plugin: &str) -> Self {
        NetworkSettings {
            subnet_id: env.var(AZURE_SUBNET_ID).filter(|v| !v.is_empty()),
            vnet_guid: env.var(AZURE_VNET_GUID).unwrap_or_default(),
            label_mode: VnetLabelMode::for_network_plugin(network_plugin),
        }
    }
}

fn api_server_name(endpoint: &str) -> Result<String, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidClusterEndpoint {
        endpoint: endpoint.to_owned(),
        reason,
    };
    let url = url::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    url.host_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid("no host".to_owned()))
}

// First 8 decimal digits of the 64-bit FNV-1a hash of the API server name
fn cluster_id_for(api_server_name: &str) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = api_server_name.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    });
    hash.to_string().chars().take(8).collect()
}
