//! Traits for the collaborators that pick images and describe instance types
//!
//! **Note**: the async traits here are defined using
//! [async-trait](https://crates.io/crates/async-trait). Implement them with
//! `#[async_trait]` and `async fn`.
use async_trait::async_trait;

use crate::apis::{AksNodeClass, InstanceType, NodeClaim};
use crate::parameters::{Parameters, StaticParameters};

/// Chooses the image and boot script for a node.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use launchtemplate::apis::{AksNodeClass, InstanceType, NodeClaim};
/// use launchtemplate::imagefamily::Resolver;
/// use launchtemplate::parameters::{Bootstrapper, Parameters, StaticParameters};
///
/// struct Script(String);
///
/// impl Bootstrapper for Script {
///     fn script(&self) -> anyhow::Result<String> {
///         Ok(self.0.clone())
///     }
/// }
///
/// struct SingleImage;
///
/// #[async_trait]
/// impl Resolver for SingleImage {
///     async fn resolve(
///         &self,
///         _node_class: &AksNodeClass,
///         _node_claim: &NodeClaim,
///         _instance_type: &InstanceType,
///         static_parameters: StaticParameters,
///     ) -> anyhow::Result<Parameters> {
///         let script = format!("#!/bin/bash\necho joining {}\n", static_parameters.cluster_name);
///         Ok(Parameters {
///             static_parameters,
///             user_data: Box::new(Script(script)),
///             image_id: "/CommunityGalleries/AKSUbuntu/images/2204gen2containerd/versions/latest".to_owned(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Resolver {
    /// Resolves the full launch parameters for a node.
    ///
    /// Fails if no image fits, e.g. when the image family has no image for
    /// the node's architecture.
    async fn resolve(
        &self,
        node_class: &AksNodeClass,
        node_claim: &NodeClaim,
        instance_type: &InstanceType,
        static_parameters: StaticParameters,
    ) -> anyhow::Result<Parameters>;
}

/// Reports facts about the cluster that images depend on.
#[async_trait]
pub trait ImageProvider {
    /// The Kubernetes version of the cluster's API server, e.g. `1.29.2`.
    async fn kube_server_version(&self) -> anyhow::Result<String>;
}

/// Classifies VM sizes by their GPU capabilities.
pub trait SkuClassifier {
    /// Returns true if the SKU has an NVIDIA GPU.
    fn is_gpu_sku(&self, sku: &str) -> bool;

    /// The GPU driver version to install for the SKU.
    fn gpu_driver_version(&self, sku: &str) -> String;

    /// The digest of the GPU driver image for the SKU.
    fn gpu_image_sha(&self, sku: &str) -> String;
}
