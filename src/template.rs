//! Assembly of the launch template for a new node.
use std::collections::{BTreeMap, BTreeSet};
use std::iter;

use scheduling::{Requirement, Requirements};
use tracing::{debug, error, instrument};

use crate::apis::{AksNodeClass, InstanceType, NodeClaim, ARCHITECTURE_ARM64, LABEL_ARCH_STABLE};
use crate::config::{AzureConfig, NetworkSettings, Options};
use crate::error::{Error, Result};
use crate::imagefamily::{ImageProvider, Resolver, SkuClassifier};
use crate::parameters::{Arch, Parameters, StaticParameters};
use crate::tags::{merge_tags, KARPENTER_MANAGED_TAG_KEY};
use crate::vnet::resolve_vnet_labels;

/// What a VM is created from: its boot script, image and tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    user_data: String,
    image_id: String,
    tags: BTreeMap<String, String>,
}

impl Template {
    /// The rendered boot script.
    pub fn user_data(&self) -> &str {
        &self.user_data
    }

    /// The image to boot.
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    /// Tags for the VM, with ARM-safe keys.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Splits the template into user data, image ID and tags.
    pub fn into_parts(self) -> (String, String, BTreeMap<String, String>) {
        (self.user_data, self.image_id, self.tags)
    }
}

/// Builds launch templates for nodes of a cluster.
///
/// A provider only reads the configuration it was built with, so a single
/// provider can serve concurrent provisioning requests.
pub struct Provider<R, I, S> {
    image_family: R,
    image_provider: I,
    sku_classifier: S,
    options: Options,
    azure: AzureConfig,
    network: NetworkSettings,
    ca_bundle: Option<String>,
}

impl<R, I, S> Provider<R, I, S>
where
    R: Resolver + Sync,
    I: ImageProvider + Sync,
    S: SkuClassifier + Sync,
{
    /// Creates a provider from its collaborators and configuration.
    pub fn new(
        image_family: R,
        image_provider: I,
        sku_classifier: S,
        options: Options,
        azure: AzureConfig,
        network: NetworkSettings,
        ca_bundle: Option<String>,
    ) -> Self {
        Provider {
            image_family,
            image_provider,
            sku_classifier,
            options,
            azure,
            network,
            ca_bundle,
        }
    }

    /// Builds the launch template for `node_claim` on `instance_type`.
    ///
    /// `additional_labels` are added to the node claim's labels and win over
    /// them. No template is returned if any step fails.
    #[instrument(
        level = "info",
        skip(self, node_class, node_claim, instance_type, additional_labels),
        fields(node_claim = node_claim.name(), instance_type = instance_type.name.as_str())
    )]
    pub async fn get_template(
        &self,
        node_class: &AksNodeClass,
        node_claim: &NodeClaim,
        instance_type: &InstanceType,
        additional_labels: &BTreeMap<String, String>,
    ) -> Result<Template> {
        let mut labels = node_claim.labels();
        labels.extend(additional_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut static_parameters = self.static_parameters(instance_type, node_class, labels)?;

        static_parameters.kubernetes_version = self
            .image_provider
            .kube_server_version()
            .await
            .map_err(|e| {
                error!(error = %e, "Unable to get kubernetes server version");
                Error::Upstream(e)
            })?;
        debug!(version = %static_parameters.kubernetes_version, "Resolving image family");

        let parameters = self
            .image_family
            .resolve(node_class, node_claim, instance_type, static_parameters)
            .await
            .map_err(|e| {
                error!(error = %e, "Unable to resolve launch template parameters");
                Error::Resolution(e)
            })?;

        create_launch_template(parameters)
    }

    fn static_parameters(
        &self,
        instance_type: &InstanceType,
        node_class: &AksNodeClass,
        mut labels: BTreeMap<String, String>,
    ) -> Result<StaticParameters> {
        let arch = arch_for(instance_type);
        debug!(%arch, "Selected node architecture");

        labels.extend(resolve_vnet_labels(
            node_class.spec.vnet_subnet_id.as_deref(),
            &self.network,
        )?);

        let sku = instance_type.name.as_str();
        Ok(StaticParameters {
            cluster_name: self.options.cluster_name.clone(),
            cluster_endpoint: self.options.cluster_endpoint.clone(),
            tags: node_class.spec.tags.clone(),
            labels,
            ca_bundle: self.ca_bundle.clone(),
            arch,
            gpu_node: self.sku_classifier.is_gpu_sku(sku),
            gpu_driver_version: self.sku_classifier.gpu_driver_version(sku),
            gpu_image_sha: self.sku_classifier.gpu_image_sha(sku),
            tenant_id: self.azure.tenant_id.clone(),
            subscription_id: self.azure.subscription_id.clone(),
            user_assigned_identity_id: self.azure.user_assigned_identity_id.clone(),
            resource_group: self.azure.resource_group.clone(),
            location: self.azure.location.clone(),
            cluster_id: self.options.cluster_id.clone(),
            api_server_name: self.options.api_server_name(),
            kubelet_client_tls_bootstrap_token: self
                .options
                .kubelet_client_tls_bootstrap_token
                .clone(),
            network_plugin: self.options.network_plugin.clone(),
            network_policy: self.options.network_policy.clone(),
            kubernetes_version: String::new(),
        })
    }
}

// arm64 is preferred whenever the instance type can run it
fn arch_for(instance_type: &InstanceType) -> Arch {
    let arm64: Requirements =
        iter::once(Requirement::one_of(LABEL_ARCH_STABLE, iter::once(ARCHITECTURE_ARM64))).collect();
    match instance_type.requirements.compatible(&arm64, &BTreeSet::new()) {
        Ok(()) => Arch::Arm64,
        Err(_) => Arch::Amd64,
    }
}

fn create_launch_template(parameters: Parameters) -> Result<Template> {
    let user_data = parameters.user_data.script().map_err(|e| {
        error!(error = %e, "Unable to render user data");
        Error::Render(e)
    })?;

    let static_parameters = &parameters.static_parameters;
    let managed: BTreeMap<String, String> = iter::once((
        KARPENTER_MANAGED_TAG_KEY.to_owned(),
        static_parameters.cluster_name.clone(),
    ))
    .collect();

    Ok(Template {
        user_data,
        image_id: parameters.image_id,
        tags: merge_tags(vec![&static_parameters.tags, &managed]),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::VnetLabelMode;
    use crate::parameters::Bootstrapper;
    use crate::vnet::{VNET_NETWORK_NAME_LABEL, VNET_SUBNET_NAME_LABEL};
    use async_trait::async_trait;

    const SUBNET_ID: &str = "/subscriptions/sub1/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1";

    struct Unused;

    #[async_trait]
    impl Resolver for Unused {
        async fn resolve(
            &self,
            _: &AksNodeClass,
            _: &NodeClaim,
            _: &InstanceType,
            _: StaticParameters,
        ) -> anyhow::Result<Parameters> {
            anyhow::bail!("not used")
        }
    }

    #[async_trait]
    impl ImageProvider for Unused {
        async fn kube_server_version(&self) -> anyhow::Result<String> {
            anyhow::bail!("not used")
        }
    }

    struct NcSeries;

    impl SkuClassifier for NcSeries {
        fn is_gpu_sku(&self, sku: &str) -> bool {
            sku.starts_with("Standard_NC")
        }

        fn gpu_driver_version(&self, sku: &str) -> String {
            if self.is_gpu_sku(sku) {
                "cuda-535.54.03".to_owned()
            } else {
                String::new()
            }
        }

        fn gpu_image_sha(&self, sku: &str) -> String {
            if self.is_gpu_sku(sku) {
                "sha-ff213d".to_owned()
            } else {
                String::new()
            }
        }
    }

    struct Fixed(anyhow::Result<String>);

    impl Bootstrapper for Fixed {
        fn script(&self) -> anyhow::Result<String> {
            match &self.0 {
                Ok(script) => Ok(script.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn provider() -> Provider<Unused, Unused, NcSeries> {
        Provider::new(
            Unused,
            Unused,
            NcSeries,
            Options {
                cluster_name: "aks-prod".to_owned(),
                cluster_endpoint: "https://aks-prod-dns-4f1c.hcp.westus2.azmk8s.io:443".to_owned(),
                cluster_id: "12345678".to_owned(),
                kubelet_client_tls_bootstrap_token: "abcdef.0123456789abcdef".to_owned(),
                network_plugin: "azure".to_owned(),
                network_policy: "cilium".to_owned(),
            },
            AzureConfig {
                tenant_id: "tenant".to_owned(),
                subscription_id: "sub".to_owned(),
                user_assigned_identity_id: "identity".to_owned(),
                resource_group: "MC_rg_aks-prod_westus2".to_owned(),
                location: "westus2".to_owned(),
            },
            NetworkSettings {
                subnet_id: Some(SUBNET_ID.to_owned()),
                vnet_guid: "guid".to_owned(),
                label_mode: VnetLabelMode::CiliumOverlay,
            },
            Some("-----BEGIN CERTIFICATE-----".to_owned()),
        )
    }

    fn instance_type(name: &str, archs: Vec<&str>) -> InstanceType {
        InstanceType::new(
            name,
            iter::once(Requirement::one_of(LABEL_ARCH_STABLE, archs)).collect(),
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn arch_prefers_arm64_when_offered() {
        assert_eq!(arch_for(&instance_type("Standard_D2s_v3", vec!["amd64"])), Arch::Amd64);
        assert_eq!(
            arch_for(&instance_type("Standard_D2ps_v5", vec!["amd64", "arm64"])),
            Arch::Arm64
        );
        assert_eq!(arch_for(&instance_type("Standard_D2ps_v5", vec!["arm64"])), Arch::Arm64);
    }

    #[test]
    fn arch_defaults_to_amd64_when_not_advertised() {
        let unknown = InstanceType::new("Standard_Unknown", Requirements::new());
        assert_eq!(arch_for(&unknown), Arch::Amd64);
    }

    #[test]
    fn static_parameters_copy_configuration() {
        let node_class = AksNodeClass::default();
        let params = provider()
            .static_parameters(
                &instance_type("Standard_NC6s_v3", vec!["amd64"]),
                &node_class,
                BTreeMap::new(),
            )
            .unwrap();

        assert_eq!(params.cluster_name, "aks-prod");
        assert_eq!(params.cluster_endpoint, "https://aks-prod-dns-4f1c.hcp.westus2.azmk8s.io:443");
        assert_eq!(params.api_server_name, "aks-prod-dns-4f1c.hcp.westus2.azmk8s.io");
        assert_eq!(params.cluster_id, "12345678");
        assert_eq!(params.kubelet_client_tls_bootstrap_token, "abcdef.0123456789abcdef");
        assert_eq!(params.network_plugin, "azure");
        assert_eq!(params.network_policy, "cilium");
        assert_eq!(params.tenant_id, "tenant");
        assert_eq!(params.subscription_id, "sub");
        assert_eq!(params.user_assigned_identity_id, "identity");
        assert_eq!(params.resource_group, "MC_rg_aks-prod_westus2");
        assert_eq!(params.location, "westus2");
        assert_eq!(params.ca_bundle.as_deref(), Some("-----BEGIN CERTIFICATE-----"));
        assert!(params.gpu_node);
        assert_eq!(params.gpu_driver_version, "cuda-535.54.03");
        assert_eq!(params.gpu_image_sha, "sha-ff213d");
        assert_eq!(params.kubernetes_version, "");
    }

    #[test]
    fn vnet_labels_win_over_caller_labels() {
        let node_class = AksNodeClass::default();
        let params = provider()
            .static_parameters(
                &instance_type("Standard_D2s_v3", vec!["amd64"]),
                &node_class,
                labels(&[(VNET_NETWORK_NAME_LABEL, "spoofed"), ("team", "compute")]),
            )
            .unwrap();

        assert!(!params.gpu_node);
        assert_eq!(params.gpu_driver_version, "");
        assert_eq!(params.labels[VNET_NETWORK_NAME_LABEL], "vnet1");
        assert_eq!(params.labels[VNET_SUBNET_NAME_LABEL], "subnet1");
        assert_eq!(params.labels["team"], "compute");
        assert_eq!(params.labels.len(), 7);
    }

    #[test]
    fn malformed_node_class_subnet_is_a_configuration_error() {
        let mut node_class = AksNodeClass::default();
        node_class.spec.vnet_subnet_id = Some("subnet1".to_owned());
        let result = provider().static_parameters(
            &instance_type("Standard_D2s_v3", vec!["amd64"]),
            &node_class,
            BTreeMap::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn managed_tag_is_merged_last() {
        let static_parameters = StaticParameters {
            cluster_name: "aks-prod".to_owned(),
            tags: labels(&[(KARPENTER_MANAGED_TAG_KEY, "someone-else"), ("cost/center", "42")]),
            ..Default::default()
        };
        let template = create_launch_template(Parameters {
            static_parameters,
            user_data: Box::new(Fixed(Ok("#!/bin/bash".to_owned()))),
            image_id: "image".to_owned(),
        })
        .unwrap();

        assert_eq!(template.user_data(), "#!/bin/bash");
        assert_eq!(template.image_id(), "image");
        assert_eq!(
            template.tags(),
            &labels(&[("karpenter.azure.com_cluster", "aks-prod"), ("cost_center", "42")])
        );
    }

    #[test]
    fn render_failure_produces_no_template() {
        let result = create_launch_template(Parameters {
            static_parameters: StaticParameters::default(),
            user_data: Box::new(Fixed(Err(anyhow::anyhow!("missing value for KUBELET_FLAGS")))),
            image_id: "image".to_owned(),
        });
        match result {
            Err(Error::Render(e)) => assert!(e.to_string().contains("KUBELET_FLAGS")),
            other => panic!("expected a render error, got {:?}", other),
        }
    }
}
