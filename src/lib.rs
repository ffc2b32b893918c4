//! A crate for assembling the launch template of a new AKS node.
//!
//! A launch template is what a VM is created from: the rendered boot script,
//! the image to boot and the tags to apply. The [`Provider`] derives the
//! image-independent [`StaticParameters`](parameters::StaticParameters) of a
//! node from its node class, node claim and instance type, hands them to an
//! image family [`Resolver`](imagefamily::Resolver) and turns the result into
//! a [`Template`].
//!
//! # Example
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use launchtemplate::config::{AzureConfig, NetworkSettings, Options, ProcessEnvironment};
//! use launchtemplate::Provider;
//! # use launchtemplate::apis::{AksNodeClass, InstanceType, NodeClaim};
//! # use launchtemplate::parameters::{Parameters, StaticParameters};
//! # struct MyResolver;
//! # #[async_trait::async_trait]
//! # impl launchtemplate::imagefamily::Resolver for MyResolver {
//! #     async fn resolve(&self, _: &AksNodeClass, _: &NodeClaim, _: &InstanceType, _: StaticParameters) -> anyhow::Result<Parameters> { todo!() }
//! # }
//! # struct MyImages;
//! # #[async_trait::async_trait]
//! # impl launchtemplate::imagefamily::ImageProvider for MyImages {
//! #     async fn kube_server_version(&self) -> anyhow::Result<String> { todo!() }
//! # }
//! # struct MySkus;
//! # impl launchtemplate::imagefamily::SkuClassifier for MySkus {
//! #     fn is_gpu_sku(&self, _: &str) -> bool { todo!() }
//! #     fn gpu_driver_version(&self, _: &str) -> String { todo!() }
//! #     fn gpu_image_sha(&self, _: &str) -> String { todo!() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = Options::from_env(&ProcessEnvironment)?;
//!     let network = NetworkSettings::from_env(&ProcessEnvironment, &options.network_plugin);
//!     let azure = AzureConfig::from_file("/etc/kubernetes/azure.json")?;
//!     let provider = Provider::new(MyResolver, MyImages, MySkus, options, azure, network, None);
//!
//!     let template = provider
//!         .get_template(
//!             &AksNodeClass::default(),
//!             &NodeClaim::default(),
//!             &InstanceType::default(),
//!             &BTreeMap::new(),
//!         )
//!         .await?;
//!     println!("booting {}", template.image_id());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(feature = "docs", feature(doc_cfg))]

pub mod apis;
pub mod config;
mod error;
pub mod imagefamily;
pub mod parameters;
pub mod tags;
mod template;
pub mod vnet;

pub use error::{ConfigurationError, Error, Result};
#[doc(inline)]
pub use template::{Provider, Template};
