//! Cloud provider detection
//!
//! The provider decides which image ConfigMap is used, where an assigned
//! image id is recorded, and whether confidential images are supported at all.

use crate::error::ImageError;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Cloud providers known to the image generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// libvirt hypervisor hosts
    Libvirt,
    /// Anything without confidential pod VM image support
    Unsupported,
}

impl CloudProvider {
    /// Whether confidential pod VM images can be built on this provider
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Lowercase provider name as used in resource names
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Libvirt => "libvirt",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parses the scheme of a Node `spec.providerID` (e.g. `aws:///us-east-1a/i-0abc`).
    pub fn from_provider_id(provider_id: &str) -> Self {
        provider_id
            .split_once("://")
            .map(|(scheme, _)| scheme.parse().unwrap_or(Self::Unsupported))
            .unwrap_or(Self::Unsupported)
    }

    /// Name of the image build ConfigMap for this provider
    pub fn image_config_map_name(self) -> String {
        format!("{}-podvm-image-cm", self.as_str())
    }

    /// Key in the peer pods ConfigMap that holds an already assigned image id
    pub fn image_id_key(self) -> Option<&'static str> {
        match self {
            Self::Aws => Some("PODVM_AMI_ID"),
            Self::Azure => Some("AZURE_IMAGE_ID"),
            Self::Libvirt => Some("LIBVIRT_IMAGE_ID"),
            Self::Unsupported => None,
        }
    }

    /// Keys that must be set (non-empty) in the image ConfigMap for the
    /// user-supplied build configuration to count as valid.
    ///
    /// Providers that need no user input return an empty slice; for them the
    /// preconfiguration subsystem always decides.
    pub fn required_config_keys(self) -> &'static [&'static str] {
        match self {
            Self::Libvirt => &["LIBVIRT_URI", "LIBVIRT_POOL", "LIBVIRT_VOL_NAME"],
            Self::Aws | Self::Azure | Self::Unsupported => &[],
        }
    }

    /// Data written to a freshly created image ConfigMap when no template file is present
    pub fn default_image_config(self) -> BTreeMap<String, String> {
        let mut data: BTreeMap<String, String> = [
            ("PODVM_DISTRO", "rhel"),
            ("CONFIDENTIAL_COMPUTE_ENABLED", "no"),
            ("IMAGE_BASE_NAME", "podvm-image"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let extra: &[(&str, &str)] = match self {
            Self::Aws => &[("INSTANCE_TYPE", "t3.large"), ("DISABLE_CLOUD_CONFIG", "true")],
            Self::Azure => &[("VM_SIZE", "Standard_DC2as_v5"), ("IMAGE_GALLERY_NAME", "PodVMGallery")],
            Self::Libvirt => &[
                ("LIBVIRT_URI", ""),
                ("LIBVIRT_POOL", ""),
                ("LIBVIRT_VOL_NAME", ""),
                ("ORG_ID", ""),
            ],
            Self::Unsupported => &[],
        };
        data.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        data
    }
}

impl FromStr for CloudProvider {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "libvirt" => Ok(Self::Libvirt),
            other => Err(ImageError::ProviderDetection(format!("unknown cloud provider '{}'", other))),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the cluster's cloud provider.
#[async_trait::async_trait]
pub trait ProviderDetector: Send + Sync {
    async fn detect(&self) -> Result<CloudProvider, ImageError>;
}

/// A fixed provider, used when the operator is told explicitly.
#[async_trait::async_trait]
impl ProviderDetector for CloudProvider {
    async fn detect(&self) -> Result<CloudProvider, ImageError> {
        Ok(*self)
    }
}

/// Detects the provider from the first Node's `spec.providerID`.
#[derive(Clone)]
pub struct NodeProviderDetector {
    nodes: Api<Node>,
}

impl NodeProviderDetector {
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl ProviderDetector for NodeProviderDetector {
    async fn detect(&self) -> Result<CloudProvider, ImageError> {
        let nodes = self
            .nodes
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| ImageError::ProviderDetection(format!("failed to list nodes: {}", e)))?;

        let provider_id = nodes
            .items
            .first()
            .and_then(|node| node.spec.as_ref())
            .and_then(|spec| spec.provider_id.as_deref())
            .unwrap_or_default();
        debug!("Node providerID: '{}'", provider_id);

        let provider = CloudProvider::from_provider_id(provider_id);
        info!("Detected cloud provider: {}", provider);
        Ok(provider)
    }
}
