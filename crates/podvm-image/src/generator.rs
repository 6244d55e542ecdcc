//! Pod VM image generator
//!
//! Answers the three questions the reconciler asks before touching image
//! configuration (is the provider supported, is an image already assigned,
//! does a valid build configuration exist) and creates the default image
//! ConfigMap on demand.
//!
//! The generator is built once per process and shared by `Arc`. Provider
//! detection happens lazily in `initialize()`, guarded by a `OnceCell` so
//! concurrent reconciliations observe a single detection.

use crate::config_map::{get_optional, ConfigMapClientTrait, ConfigResource};
use crate::error::{ImageError, ResourceError};
use crate::provider::{CloudProvider, ProviderDetector};
use crate::template;
use k8s_openapi::api::core::v1::ConfigMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Name of the peer pods ConfigMap
pub const PEER_PODS_CM_NAME: &str = "peer-pods-cm";

/// Read-only view of the generator's world, fetched fresh on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageGeneratorSnapshot {
    /// The detected provider has pod VM image support
    pub provider_supported: bool,
    /// peer-pods-cm already names an image for the provider
    pub image_id_already_set: bool,
    /// The image ConfigMap holds every key the provider requires
    pub valid_config_exists: bool,
}

/// Trait for image generator operations
///
/// This trait enables mocking of the image generator in reconciler tests.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Idempotent; safe to call from concurrent reconciliations.
    async fn initialize(&self) -> Result<(), ImageError>;

    /// Detected provider; `Unsupported` before a successful `initialize()`.
    fn provider(&self) -> CloudProvider;

    /// Reads the current state; never cached.
    async fn snapshot(&self) -> Result<ImageGeneratorSnapshot, ImageError>;

    /// Creates the image ConfigMap if it is absent. A no-op when present.
    async fn materialize_default_config(&self) -> Result<(), ImageError>;

    /// Name of the image ConfigMap for the detected provider
    fn config_resource_name(&self) -> String {
        self.provider().image_config_map_name()
    }
}

/// Where the generator reads and writes.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Namespace of the peer pods and image ConfigMaps
    pub namespace: String,
    /// Directory searched for `<provider>-podvm-image-cm.yaml`
    pub template_dir: PathBuf,
}

/// Image generator backed by ConfigMaps in the operator namespace.
pub struct PodVmImageGenerator {
    config_maps: Arc<dyn ConfigMapClientTrait>,
    detector: Arc<dyn ProviderDetector>,
    settings: GeneratorSettings,
    provider: OnceCell<CloudProvider>,
}

impl PodVmImageGenerator {
    /// Creates a generator; the provider is detected on the first `initialize()`.
    pub fn new(
        config_maps: Arc<dyn ConfigMapClientTrait>,
        detector: Arc<dyn ProviderDetector>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            config_maps,
            detector,
            settings,
            provider: OnceCell::new(),
        }
    }

    fn template_path(&self, provider: CloudProvider) -> PathBuf {
        self.settings
            .template_dir
            .join(format!("{}.yaml", provider.image_config_map_name()))
    }

    /// Image ConfigMap contents: the provider template if shipped, built-in defaults otherwise.
    async fn default_config(&self, provider: CloudProvider) -> Result<ConfigResource, ImageError> {
        let name = provider.image_config_map_name();
        let path = self.template_path(provider);
        let data = match template::load_optional::<ConfigMap>(&path).await? {
            Some(cm) => {
                debug!("Using image ConfigMap template {}", path.display());
                cm.data.unwrap_or_default()
            }
            None => provider.default_image_config(),
        };
        Ok(ConfigResource {
            name,
            namespace: self.settings.namespace.clone(),
            data,
        })
    }

    async fn image_id_set(&self, provider: CloudProvider) -> Result<bool, ImageError> {
        let Some(key) = provider.image_id_key() else {
            return Ok(false);
        };
        let peer_pods =
            get_optional(self.config_maps.as_ref(), PEER_PODS_CM_NAME, &self.settings.namespace).await?;
        Ok(peer_pods.is_some_and(|cm| cm.non_empty(key).is_some()))
    }

    async fn configs_exist(&self, provider: CloudProvider) -> Result<bool, ImageError> {
        let required = provider.required_config_keys();
        if required.is_empty() {
            return Ok(false);
        }
        let image_cm = get_optional(
            self.config_maps.as_ref(),
            &provider.image_config_map_name(),
            &self.settings.namespace,
        )
        .await?;
        Ok(image_cm.is_some_and(|cm| required.iter().all(|key| cm.non_empty(key).is_some())))
    }
}

#[async_trait::async_trait]
impl ImageGenerator for PodVmImageGenerator {
    async fn initialize(&self) -> Result<(), ImageError> {
        self.provider
            .get_or_try_init(|| async {
                let provider = self.detector.detect().await?;
                info!("Image generator initialized for provider {}", provider);
                Ok::<_, ImageError>(provider)
            })
            .await?;
        Ok(())
    }

    fn provider(&self) -> CloudProvider {
        self.provider.get().copied().unwrap_or(CloudProvider::Unsupported)
    }

    async fn snapshot(&self) -> Result<ImageGeneratorSnapshot, ImageError> {
        let provider = self.provider();
        if !provider.is_supported() {
            return Ok(ImageGeneratorSnapshot::default());
        }
        Ok(ImageGeneratorSnapshot {
            provider_supported: true,
            image_id_already_set: self.image_id_set(provider).await?,
            valid_config_exists: self.configs_exist(provider).await?,
        })
    }

    async fn materialize_default_config(&self) -> Result<(), ImageError> {
        let provider = self.provider();
        if !provider.is_supported() {
            return Err(ImageError::ProviderDetection(
                "no image configuration exists for an unsupported provider".to_string(),
            ));
        }
        let resource = self.default_config(provider).await?;
        match self.config_maps.create(&resource).await {
            Ok(()) => {
                info!("Created image ConfigMap {}/{}", resource.namespace, resource.name);
                Ok(())
            }
            Err(ResourceError::AlreadyExists(_)) => {
                debug!("Image ConfigMap {}/{} already exists", resource.namespace, resource.name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
