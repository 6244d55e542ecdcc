//! Test utilities for unit testing reconcilers
//!
//! This module provides a condition reporter that records what it was asked
//! to report and a harness wiring `FeatureReconciler` to in-memory mocks.

#[cfg(test)]
use crate::conditions::ConditionReporter;
#[cfg(test)]
use crate::metrics::Metrics;
#[cfg(test)]
use crate::reconciler::confidential::FeatureReconciler;
#[cfg(test)]
use crds::ProgressCondition;
#[cfg(test)]
use podvm_image::{
    CloudProvider, ConfigResource, ImageGenerator, ImageGeneratorSnapshot, MockConfigMapClient,
    MockImageGenerator, MockPreconfigurator, PreConfigOutcome, PEER_PODS_CM_NAME,
};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Namespace used by reconciler tests
#[cfg(test)]
pub const TEST_NAMESPACE: &str = "openshift-sandboxed-containers-operator";

/// Condition reporter that remembers every report
#[cfg(test)]
#[derive(Default)]
pub struct RecordingConditionReporter {
    reported: Mutex<Vec<ProgressCondition>>,
}

#[cfg(test)]
impl RecordingConditionReporter {
    pub fn reported(&self) -> Vec<ProgressCondition> {
        self.reported.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl ConditionReporter for RecordingConditionReporter {
    async fn report(&self, condition: ProgressCondition) {
        self.reported.lock().unwrap().push(condition);
    }
}

/// A `FeatureReconciler` over mocks, with handles for assertions
#[cfg(test)]
pub struct Harness {
    pub config_maps: MockConfigMapClient,
    pub generator: MockImageGenerator,
    pub preconfigurator: MockPreconfigurator,
    pub conditions: RecordingConditionReporter,
    pub metrics: Arc<Metrics>,
    pub reconciler: FeatureReconciler,
}

#[cfg(test)]
impl Harness {
    /// AWS provider, nothing converged, preconfiguration returning `outcome`
    pub fn new(outcome: PreConfigOutcome) -> Self {
        Self::with(CloudProvider::Aws, MockPreconfigurator::new(outcome))
    }

    pub fn with(provider: CloudProvider, preconfigurator: MockPreconfigurator) -> Self {
        let config_maps = MockConfigMapClient::new();
        let generator = MockImageGenerator::new(provider, TEST_NAMESPACE, config_maps.clone());
        let metrics = Arc::new(Metrics::new().unwrap());
        let reconciler = FeatureReconciler::new(
            Arc::new(generator.clone()),
            Arc::new(preconfigurator.clone()),
            Arc::new(config_maps.clone()),
            TEST_NAMESPACE,
            metrics.clone(),
        );
        Self {
            config_maps,
            generator,
            preconfigurator,
            conditions: RecordingConditionReporter::default(),
            metrics,
            reconciler,
        }
    }

    pub fn with_snapshot(self, snapshot: ImageGeneratorSnapshot) -> Self {
        self.generator.set_snapshot(snapshot);
        self
    }

    /// Adds an empty peer-pods-cm
    pub fn with_peer_pods_cm(self) -> Self {
        self.config_maps
            .insert(ConfigResource::new(PEER_PODS_CM_NAME, TEST_NAMESPACE));
        self
    }

    /// Adds an empty image ConfigMap for the generator's provider
    pub fn with_image_cm(self) -> Self {
        self.config_maps.insert(ConfigResource::new(
            self.generator.provider().image_config_map_name(),
            TEST_NAMESPACE,
        ));
        self
    }

    /// Value of `key` in the ConfigMap `name`, if both exist
    pub fn value(&self, name: &str, key: &str) -> Option<String> {
        self.config_maps
            .stored(name, TEST_NAMESPACE)
            .and_then(|cm| cm.data.get(key).cloned())
    }

    pub fn image_cm_name(&self) -> String {
        self.generator.provider().image_config_map_name()
    }
}
