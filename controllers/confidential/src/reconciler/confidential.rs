//! Confidential computing feature reconciliation.
//!
//! One pass moves two ConfigMaps toward the requested feature state:
//!
//! - the provider image ConfigMap (`<provider>-podvm-image-cm`), whose
//!   `CONFIDENTIAL_COMPUTE_ENABLED` key selects a confidential image build,
//! - `peer-pods-cm`, whose `DISABLECVM` key tells the cloud API adaptor
//!   whether to request confidential VMs.
//!
//! Before the image ConfigMap is touched an image-readiness gate decides
//! whether pod VM image preconfiguration still has to run. Preconfiguration
//! that is still pending stops the pass; the scheduler calls again later.
//! Each pass starts from whatever state the cluster is in, so a pass that
//! failed between the two writes is simply repeated.

use crate::conditions::ConditionReporter;
use crate::error::ControllerError;
use crate::feature_gates::FeatureGateState;
use crate::metrics::Metrics;
use crate::reconcile_helpers::{patch_if_exists, single_entry};
use crds::ProgressCondition;
use podvm_image::{
    ConfigMapClientTrait, ImageError, ImageGenerator, PreConfigOutcome, Preconfigurator,
    PEER_PODS_CM_NAME,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Image ConfigMap key selecting a confidential image build
pub const CONFIDENTIAL_COMPUTE_ENABLED: &str = "CONFIDENTIAL_COMPUTE_ENABLED";

/// peer-pods-cm key turning confidential VMs off
pub const DISABLECVM: &str = "DISABLECVM";

/// What the gate does after a preconfiguration outcome
#[derive(Debug)]
pub enum GateDecision {
    /// Go on to the image and peer pods ConfigMaps
    Continue,
    /// End the pass, returning the error if there is one
    Stop(Option<ImageError>),
}

/// Condition and control action for one preconfiguration outcome
#[derive(Debug)]
pub struct PreConfigStep {
    /// Condition to report, if the outcome has one
    pub condition: Option<ProgressCondition>,
    /// Whether the pass goes on
    pub decision: GateDecision,
}

/// Maps a preconfiguration outcome to its condition and control action.
///
/// | Outcome               | Condition                   | Action                         |
/// |-----------------------|-----------------------------|--------------------------------|
/// | `Succeeded`           | `ImagePreConfigured`        | continue                       |
/// | `UnsupportedProvider` | `ConfigUnsupportedProvider` | continue                       |
/// | `RequeueNeeded`       | `PreConfiguring`            | stop                           |
/// | `ImageCreationFailed` | `ImageCreationFailed`       | stop with error, else continue |
/// | `StatusUnknown`       | `PreConfigurationUnknown`   | stop                           |
/// | `Other`               | none                        | continue                       |
///
/// A failed image creation without an error was already recorded by the
/// image job, so the pass carries on and the failure is only logged.
pub fn preconfig_step(outcome: PreConfigOutcome, error: Option<ImageError>) -> PreConfigStep {
    let (condition, decision) = match outcome {
        PreConfigOutcome::Succeeded => {
            (Some(ProgressCondition::ImagePreConfigured), continue_logging(outcome, error))
        }
        PreConfigOutcome::UnsupportedProvider => (
            Some(ProgressCondition::ConfigUnsupportedProvider),
            continue_logging(outcome, error),
        ),
        PreConfigOutcome::RequeueNeeded => {
            (Some(ProgressCondition::PreConfiguring), GateDecision::Stop(error))
        }
        PreConfigOutcome::ImageCreationFailed => match error {
            Some(e) => (Some(ProgressCondition::ImageCreationFailed), GateDecision::Stop(Some(e))),
            None => {
                warn!("Pod VM image creation failed, continuing with configuration");
                (Some(ProgressCondition::ImageCreationFailed), GateDecision::Continue)
            }
        },
        PreConfigOutcome::StatusUnknown => {
            (Some(ProgressCondition::PreConfigurationUnknown), GateDecision::Stop(error))
        }
        PreConfigOutcome::Other => {
            info!("Preconfiguration returned an unhandled outcome, continuing");
            (None, continue_logging(outcome, error))
        }
    };
    PreConfigStep { condition, decision }
}

fn continue_logging(outcome: PreConfigOutcome, error: Option<ImageError>) -> GateDecision {
    if let Some(e) = error {
        warn!("Preconfiguration outcome {} carried an error: {}", outcome, e);
    }
    GateDecision::Continue
}

/// Why the gate let the pass continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatePass {
    /// Unsupported provider or image already assigned; leave the image ConfigMap alone
    SkipImageConfig,
    /// Go on to reconcile the image ConfigMap
    ImageConfig,
}

/// Reconciles the confidential computing feature.
pub struct FeatureReconciler {
    generator: Arc<dyn ImageGenerator>,
    preconfigurator: Arc<dyn Preconfigurator>,
    config_maps: Arc<dyn ConfigMapClientTrait>,
    namespace: String,
    metrics: Arc<Metrics>,
}

impl FeatureReconciler {
    /// Creates a reconciler writing ConfigMaps in `namespace`.
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        preconfigurator: Arc<dyn Preconfigurator>,
        config_maps: Arc<dyn ConfigMapClientTrait>,
        namespace: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            generator,
            preconfigurator,
            config_maps,
            namespace: namespace.into(),
            metrics,
        }
    }

    /// Runs one reconciliation pass toward `state`.
    ///
    /// Returns `Ok(())` when the pass completed or stopped for pending
    /// preconfiguration without an error. Any returned error makes the
    /// scheduler retry the whole pass.
    pub async fn reconcile_feature(
        &self,
        state: FeatureGateState,
        conditions: &dyn ConditionReporter,
    ) -> Result<(), ControllerError> {
        debug!("Reconciling confidential feature, requested state {}", state);

        match self.image_readiness_gate(conditions).await? {
            ControlFlow::Break(None) => return Ok(()),
            ControlFlow::Break(Some(e)) => return Err(e.into()),
            ControlFlow::Continue(GatePass::SkipImageConfig) => {}
            ControlFlow::Continue(GatePass::ImageConfig) => {
                self.reconcile_image_config(state).await?;
            }
        }

        self.reconcile_peer_pods_config(state).await
    }

    async fn image_readiness_gate(
        &self,
        conditions: &dyn ConditionReporter,
    ) -> Result<ControlFlow<Option<ImageError>, GatePass>, ControllerError> {
        self.generator.initialize().await?;
        let snapshot = self.generator.snapshot().await?;

        if !snapshot.provider_supported {
            info!(
                "Cloud provider {} has no pod VM image support, skipping image configuration",
                self.generator.provider()
            );
            return Ok(ControlFlow::Continue(GatePass::SkipImageConfig));
        }
        if snapshot.image_id_already_set {
            info!("Pod VM image already assigned, skipping image configuration");
            return Ok(ControlFlow::Continue(GatePass::SkipImageConfig));
        }
        if snapshot.valid_config_exists {
            debug!("Pod VM image build configuration present, skipping preconfiguration");
            return Ok(ControlFlow::Continue(GatePass::ImageConfig));
        }

        let (outcome, error) = self.preconfigurator.run().await;
        self.metrics.record_preconfig(outcome);
        info!("Pod VM image preconfiguration outcome: {}", outcome);

        let step = preconfig_step(outcome, error);
        match step.condition {
            Some(ProgressCondition::ImagePreConfigured) => conditions.image_pre_configured().await,
            Some(ProgressCondition::ConfigUnsupportedProvider) => {
                conditions.config_unsupported_provider().await;
            }
            Some(ProgressCondition::PreConfiguring) => conditions.pre_configuring().await,
            Some(ProgressCondition::ImageCreationFailed) => conditions.image_creation_failed().await,
            Some(ProgressCondition::PreConfigurationUnknown) => {
                conditions.pre_configuration_unknown().await;
            }
            None => {}
        }
        Ok(match step.decision {
            GateDecision::Continue => ControlFlow::Continue(GatePass::ImageConfig),
            GateDecision::Stop(error) => ControlFlow::Break(error),
        })
    }

    async fn reconcile_image_config(&self, state: FeatureGateState) -> Result<(), ControllerError> {
        let name = self.generator.config_resource_name();
        match state {
            FeatureGateState::Enabled => {
                self.generator.materialize_default_config().await?;
                let data = single_entry(CONFIDENTIAL_COMPUTE_ENABLED, "yes");
                self.config_maps.patch(&name, &self.namespace, &data).await?;
                info!("Enabled confidential compute in {}", name);
            }
            FeatureGateState::Disabled => {
                let data = single_entry(CONFIDENTIAL_COMPUTE_ENABLED, "no");
                if patch_if_exists(self.config_maps.as_ref(), &name, &self.namespace, &data).await? {
                    info!("Disabled confidential compute in {}", name);
                } else {
                    debug!("Image ConfigMap {} absent, nothing to disable", name);
                }
            }
        }
        Ok(())
    }

    async fn reconcile_peer_pods_config(&self, state: FeatureGateState) -> Result<(), ControllerError> {
        let value = match state {
            FeatureGateState::Enabled => "false",
            FeatureGateState::Disabled => "true",
        };
        let data = single_entry(DISABLECVM, value);
        let patched =
            patch_if_exists(self.config_maps.as_ref(), PEER_PODS_CM_NAME, &self.namespace, &data)
                .await?;
        if patched {
            info!("Set {}={} in {}", DISABLECVM, value, PEER_PODS_CM_NAME);
        } else if state == FeatureGateState::Enabled {
            info!(
                "{} not present yet, confidential VMs will be enabled once peer pods is configured",
                PEER_PODS_CM_NAME
            );
        } else {
            debug!("{} not present, nothing to disable", PEER_PODS_CM_NAME);
        }
        Ok(())
    }
}
