//! Reconciliation logic for `KataConfig` resources.
//!
//! - `confidential`: the confidential computing feature pass
//!
//! `Reconciler` wraps the feature pass for the watcher: it reads the feature
//! gates, reports progress on the delivered `KataConfig`, and tracks error
//! backoff per object.

pub mod confidential;
#[cfg(test)]
mod confidential_test;

use crate::backoff::FibonacciBackoff;
use crate::conditions::{ConditionReporter, KataConfigConditionReporter};
use crate::error::ControllerError;
use crate::feature_gates::FeatureGates;
use crate::metrics::Metrics;
use confidential::FeatureReconciler;
use crds::KataConfig;
use kube::{Api, ResourceExt};
use podvm_image::ConfigMapClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKOFF_MIN: Duration = Duration::from_secs(15);
const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(BACKOFF_MIN, BACKOFF_MAX),
            error_count: 0,
        }
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Error backoff per object key
#[derive(Debug, Default)]
pub struct BackoffStates {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffStates {
    /// Records a failure and returns the delay before the next attempt
    /// together with the consecutive error count.
    pub fn next_backoff(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                (BACKOFF_MIN, 0)
            }
        }
    }

    /// Clears the failures of `key` after a successful pass.
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }
}

/// Reconciles `KataConfig` resources.
pub struct Reconciler {
    pub(crate) feature: FeatureReconciler,
    config_maps: Arc<dyn ConfigMapClientTrait>,
    kata_config_api: Api<KataConfig>,
    namespace: String,
    metrics: Arc<Metrics>,
    backoff_states: BackoffStates,
}

impl Reconciler {
    /// Creates a reconciler reading feature gates from `namespace`.
    pub fn new(
        feature: FeatureReconciler,
        config_maps: Arc<dyn ConfigMapClientTrait>,
        kata_config_api: Api<KataConfig>,
        namespace: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            feature,
            config_maps,
            kata_config_api,
            namespace: namespace.into(),
            metrics,
            backoff_states: BackoffStates::default(),
        }
    }

    /// Reconciles the confidential feature for one `KataConfig`.
    pub async fn reconcile_kata_config(&self, kata_config: &KataConfig) -> Result<(), ControllerError> {
        let reporter = KataConfigConditionReporter::new(self.kata_config_api.clone(), kata_config);
        self.reconcile_with(&kata_config.name_any(), &reporter).await
    }

    pub(crate) async fn reconcile_with(
        &self,
        name: &str,
        conditions: &dyn ConditionReporter,
    ) -> Result<(), ControllerError> {
        let gates = FeatureGates::load(self.config_maps.as_ref(), &self.namespace).await?;
        debug!("KataConfig {}: confidential feature {}", name, gates.confidential);

        let result = self.feature.reconcile_feature(gates.confidential, conditions).await;
        match &result {
            Ok(()) => {
                self.metrics.record_reconcile("success");
                info!("KataConfig {} reconciled", name);
            }
            Err(e) => {
                self.metrics.record_reconcile("error");
                warn!("KataConfig {} reconciliation failed: {}", name, e);
            }
        }
        result
    }

    /// Delay before retrying `key` after a failed pass
    pub fn next_backoff(&self, key: &str) -> Duration {
        let (delay, error_count) = self.backoff_states.next_backoff(key);
        debug!("KataConfig {} failed {} time(s), retrying in {:?}", key, error_count, delay);
        delay
    }

    /// Clears the backoff of `key` after a successful pass
    pub fn reset_backoff(&self, key: &str) {
        self.backoff_states.reset(key);
    }
}
