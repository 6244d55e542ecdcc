//! ConfigMap access
//!
//! `ConfigMapClientTrait` is the update primitive the reconciler works
//! through. The Kubernetes implementation uses JSON merge patches, so writes
//! only touch the keys they name and never conflict on `resourceVersion`.

use crate::error::ResourceError;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// A named key/value configuration resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigResource {
    /// ConfigMap name
    pub name: String,
    /// ConfigMap namespace
    pub namespace: String,
    /// Entries; blank values count as unset
    pub data: BTreeMap<String, String>,
}

impl ConfigResource {
    /// Creates an empty resource.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a key, builder style.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Value of `key`, treating an empty string as unset.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn from_config_map(cm: ConfigMap, namespace: &str) -> Self {
        Self {
            name: cm.metadata.name.unwrap_or_default(),
            namespace: cm.metadata.namespace.unwrap_or_else(|| namespace.to_string()),
            data: cm.data.unwrap_or_default(),
        }
    }

    fn to_config_map(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(self.data.clone()),
            ..Default::default()
        }
    }
}

impl From<ConfigMap> for ConfigResource {
    fn from(cm: ConfigMap) -> Self {
        let namespace = cm.metadata.namespace.clone().unwrap_or_default();
        Self::from_config_map(cm, &namespace)
    }
}

/// Trait for ConfigMap operations
///
/// This trait enables mocking of ConfigMap access for unit testing.
/// Implementations must report an absent resource as `ResourceError::NotFound`.
#[async_trait::async_trait]
pub trait ConfigMapClientTrait: Send + Sync {
    /// Reads a ConfigMap.
    async fn get(&self, name: &str, namespace: &str) -> Result<ConfigResource, ResourceError>;

    /// Creates a ConfigMap; `AlreadyExists` if it is present.
    async fn create(&self, resource: &ConfigResource) -> Result<(), ResourceError>;

    /// Merges `data` into an existing ConfigMap; `NotFound` if it is absent.
    async fn patch(
        &self,
        name: &str,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError>;
}

/// Reads a ConfigMap, mapping `NotFound` to `None`.
pub async fn get_optional(
    client: &dyn ConfigMapClientTrait,
    name: &str,
    namespace: &str,
) -> Result<Option<ConfigResource>, ResourceError> {
    match client.get(name, namespace).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// ConfigMap access backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeConfigMapClient {
    client: Client,
    field_manager: String,
}

impl KubeConfigMapClient {
    /// Creates a client that writes as `field_manager`.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ConfigMapClientTrait for KubeConfigMapClient {
    async fn get(&self, name: &str, namespace: &str) -> Result<ConfigResource, ResourceError> {
        let cm = self
            .api(namespace)
            .get(name)
            .await
            .map_err(|e| ResourceError::from_kube(e, &format!("configmap {}/{}", namespace, name)))?;
        Ok(ConfigResource::from_config_map(cm, namespace))
    }

    async fn create(&self, resource: &ConfigResource) -> Result<(), ResourceError> {
        let pp = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(&resource.namespace)
            .create(&pp, &resource.to_config_map())
            .await
            .map_err(|e| {
                ResourceError::from_kube(
                    e,
                    &format!("configmap {}/{}", resource.namespace, resource.name),
                )
            })?;
        debug!("Created ConfigMap {}/{}", resource.namespace, resource.name);
        Ok(())
    }

    async fn patch(
        &self,
        name: &str,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError> {
        let patch = serde_json::json!({ "data": data });
        let pp = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(namespace)
            .patch(name, &pp, &Patch::Merge(&patch))
            .await
            .map_err(|e| ResourceError::from_kube(e, &format!("configmap {}/{}", namespace, name)))?;
        debug!("Patched ConfigMap {}/{} with {:?}", namespace, name, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_ignores_blank_values() {
        let resource = ConfigResource::new("peer-pods-cm", "ns")
            .with_entry("PODVM_AMI_ID", "  ")
            .with_entry("AZURE_IMAGE_ID", "/images/podvm");
        assert_eq!(resource.non_empty("PODVM_AMI_ID"), None);
        assert_eq!(resource.non_empty("AZURE_IMAGE_ID"), Some("/images/podvm"));
        assert_eq!(resource.non_empty("MISSING"), None);
    }

    #[test]
    fn test_config_map_conversion_keeps_data() {
        let resource = ConfigResource::new("aws-podvm-image-cm", "ns").with_entry("PODVM_DISTRO", "rhel");
        let cm = resource.to_config_map();
        assert_eq!(cm.metadata.name.as_deref(), Some("aws-podvm-image-cm"));
        assert_eq!(ConfigResource::from(cm), resource);
    }
}
