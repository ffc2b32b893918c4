//! Errors returned while assembling a launch template
use thiserror::Error;

/// A failure to produce a [`Template`](crate::Template).
///
/// Every variant aborts the provisioning attempt; nothing in this crate
/// retries.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider or node class is misconfigured
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The cluster's Kubernetes version could not be retrieved
    #[error("unable to get kubernetes server version: {0}")]
    Upstream(#[source] anyhow::Error),
    /// The image family resolver could not produce a consistent parameter set
    #[error("unable to resolve launch template parameters: {0}")]
    Resolution(#[source] anyhow::Error),
    /// The boot script could not be rendered
    #[error("unable to render user data: {0}")]
    Render(#[source] anyhow::Error),
}

/// Invalid or missing configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The subnet resource ID has too few path segments to extract the
    /// subscription, virtual network and subnet from
    #[error("malformed subnet identifier {subnet_id:?}: expected at least 3 path segments")]
    MalformedSubnetId {
        /// The identifier as given
        subnet_id: String,
    },
    /// Neither the node class nor the environment names a subnet
    #[error("no subnet configured: set vnetSubnetID on the node class or AZURE_SUBNET_ID")]
    MissingSubnetId,
    /// A required option was not set
    #[error("missing required option {name}")]
    MissingOption {
        /// The option's environment variable name
        name: &'static str,
    },
    /// The cluster endpoint is not a URL with a host
    #[error("invalid cluster endpoint {endpoint:?}: {reason}")]
    InvalidClusterEndpoint {
        /// The endpoint as given
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },
}

/// A result whose error is a launch template [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
