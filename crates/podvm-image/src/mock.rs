//! In-memory collaborators for unit testing
//!
//! These mocks let reconciler tests run without a cluster. Every mock is
//! `Clone` and shares its state, so a test keeps one handle for assertions
//! while the code under test owns another.

use crate::config_map::{ConfigMapClientTrait, ConfigResource};
use crate::error::{ImageError, ResourceError};
use crate::generator::{ImageGenerator, ImageGeneratorSnapshot};
use crate::preconfig::{PreConfigOutcome, Preconfigurator};
use crate::provider::CloudProvider;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// One recorded `patch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCall {
    /// Target ConfigMap
    pub name: String,
    /// Target namespace
    pub namespace: String,
    /// Patched entries
    pub data: BTreeMap<String, String>,
}

/// Mock ConfigMap store
///
/// Patching an absent ConfigMap returns `NotFound`, like the API server.
#[derive(Clone, Default)]
pub struct MockConfigMapClient {
    store: Arc<Mutex<HashMap<(String, String), ConfigResource>>>,
    patches: Arc<Mutex<Vec<PatchCall>>>,
    creates: Arc<Mutex<Vec<String>>>,
    failing_patches: Arc<Mutex<HashMap<String, String>>>,
}

impl MockConfigMapClient {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a ConfigMap (for test setup)
    pub fn insert(&self, resource: ConfigResource) {
        self.store
            .lock()
            .unwrap()
            .insert((resource.namespace.clone(), resource.name.clone()), resource);
    }

    /// Set a single key directly, bypassing call recording (for test setup)
    pub fn patch_entry(&self, name: &str, namespace: &str, key: &str, value: &str) {
        if let Some(resource) = self
            .store
            .lock()
            .unwrap()
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            resource.data.insert(key.to_string(), value.to_string());
        }
    }

    /// Current contents of a ConfigMap
    pub fn stored(&self, name: &str, namespace: &str) -> Option<ConfigResource> {
        self.store
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make every patch of `name` fail with `Rejected(message)`
    pub fn fail_patch(&self, name: &str, message: &str) {
        self.failing_patches
            .lock()
            .unwrap()
            .insert(name.to_string(), message.to_string());
    }

    /// All patch calls, including those that returned an error
    pub fn patches(&self) -> Vec<PatchCall> {
        self.patches.lock().unwrap().clone()
    }

    /// Patch calls that targeted `name`
    pub fn patches_for(&self, name: &str) -> Vec<PatchCall> {
        self.patches().into_iter().filter(|p| p.name == name).collect()
    }

    /// Names passed to `create`, including those that already existed
    pub fn creates(&self) -> Vec<String> {
        self.creates.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ConfigMapClientTrait for MockConfigMapClient {
    async fn get(&self, name: &str, namespace: &str) -> Result<ConfigResource, ResourceError> {
        self.stored(name, namespace)
            .ok_or_else(|| ResourceError::NotFound(format!("configmap {}/{}", namespace, name)))
    }

    async fn create(&self, resource: &ConfigResource) -> Result<(), ResourceError> {
        self.creates.lock().unwrap().push(resource.name.clone());
        let mut store = self.store.lock().unwrap();
        let key = (resource.namespace.clone(), resource.name.clone());
        if store.contains_key(&key) {
            return Err(ResourceError::AlreadyExists(format!(
                "configmap {}/{}",
                resource.namespace, resource.name
            )));
        }
        store.insert(key, resource.clone());
        Ok(())
    }

    async fn patch(
        &self,
        name: &str,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError> {
        self.patches.lock().unwrap().push(PatchCall {
            name: name.to_string(),
            namespace: namespace.to_string(),
            data: data.clone(),
        });
        if let Some(message) = self.failing_patches.lock().unwrap().get(name) {
            return Err(ResourceError::Rejected(message.clone()));
        }
        let mut store = self.store.lock().unwrap();
        match store.get_mut(&(namespace.to_string(), name.to_string())) {
            Some(resource) => {
                resource
                    .data
                    .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            None => Err(ResourceError::NotFound(format!("configmap {}/{}", namespace, name))),
        }
    }
}

/// Mock image generator
///
/// The snapshot is fixed by the test. `materialize_default_config` creates an
/// empty image ConfigMap in the shared `MockConfigMapClient`.
#[derive(Clone)]
pub struct MockImageGenerator {
    provider: CloudProvider,
    namespace: String,
    snapshot: Arc<Mutex<ImageGeneratorSnapshot>>,
    config_maps: MockConfigMapClient,
    initialize_calls: Arc<Mutex<u32>>,
    materialize_calls: Arc<Mutex<u32>>,
}

impl MockImageGenerator {
    /// Generator for `provider` whose snapshot reports only provider support
    pub fn new(
        provider: CloudProvider,
        namespace: impl Into<String>,
        config_maps: MockConfigMapClient,
    ) -> Self {
        let snapshot = ImageGeneratorSnapshot {
            provider_supported: provider.is_supported(),
            ..Default::default()
        };
        Self {
            provider,
            namespace: namespace.into(),
            snapshot: Arc::new(Mutex::new(snapshot)),
            config_maps,
            initialize_calls: Arc::new(Mutex::new(0)),
            materialize_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Replace the snapshot returned from now on
    pub fn set_snapshot(&self, snapshot: ImageGeneratorSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    /// Number of `initialize` calls
    pub fn initialize_calls(&self) -> u32 {
        *self.initialize_calls.lock().unwrap()
    }

    /// Number of `materialize_default_config` calls
    pub fn materialize_calls(&self) -> u32 {
        *self.materialize_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn initialize(&self) -> Result<(), ImageError> {
        *self.initialize_calls.lock().unwrap() += 1;
        Ok(())
    }

    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn snapshot(&self) -> Result<ImageGeneratorSnapshot, ImageError> {
        Ok(*self.snapshot.lock().unwrap())
    }

    async fn materialize_default_config(&self) -> Result<(), ImageError> {
        *self.materialize_calls.lock().unwrap() += 1;
        let resource = ConfigResource::new(self.config_resource_name(), self.namespace.clone());
        match self.config_maps.create(&resource).await {
            Ok(()) | Err(ResourceError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Mock preconfiguration subsystem returning a fixed outcome
#[derive(Clone)]
pub struct MockPreconfigurator {
    outcome: Arc<Mutex<(PreConfigOutcome, Option<String>)>>,
    calls: Arc<Mutex<u32>>,
}

impl MockPreconfigurator {
    /// Always returns `outcome` without an error
    pub fn new(outcome: PreConfigOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new((outcome, None))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Always returns `outcome` with `ImageError::Preconfiguration(message)`
    pub fn with_error(outcome: PreConfigOutcome, message: &str) -> Self {
        Self {
            outcome: Arc::new(Mutex::new((outcome, Some(message.to_string())))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of `run` calls
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Preconfigurator for MockPreconfigurator {
    async fn run(&self) -> (PreConfigOutcome, Option<ImageError>) {
        *self.calls.lock().unwrap() += 1;
        let (outcome, message) = self.outcome.lock().unwrap().clone();
        (outcome, message.map(ImageError::Preconfiguration))
    }
}
