//! Progress reporting on the `KataConfig` status.

use crate::reconcile_helpers::upsert_condition;
use crds::{KataConfig, KataConfigCondition, ProgressCondition, IN_PROGRESS_CONDITION};
use kube::api::{Patch, PatchParams};
use kube::Api;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Records preconfiguration progress where operators can see it.
///
/// Reporting never fails the reconciliation; implementations log and move on.
#[async_trait::async_trait]
pub trait ConditionReporter: Send + Sync {
    async fn report(&self, condition: ProgressCondition);

    async fn image_pre_configured(&self) {
        self.report(ProgressCondition::ImagePreConfigured).await;
    }

    async fn config_unsupported_provider(&self) {
        self.report(ProgressCondition::ConfigUnsupportedProvider).await;
    }

    async fn pre_configuring(&self) {
        self.report(ProgressCondition::PreConfiguring).await;
    }

    async fn image_creation_failed(&self) {
        self.report(ProgressCondition::ImageCreationFailed).await;
    }

    async fn pre_configuration_unknown(&self) {
        self.report(ProgressCondition::PreConfigurationUnknown).await;
    }
}

/// Builds the `InProgress` condition for `progress`.
pub fn in_progress_condition(progress: ProgressCondition) -> KataConfigCondition {
    KataConfigCondition {
        type_: IN_PROGRESS_CONDITION.to_string(),
        status: progress.status().to_string(),
        reason: progress.reason().to_string(),
        message: progress.message().to_string(),
        last_transition_time: Some(chrono::Utc::now()),
    }
}

/// Writes the `InProgress` condition of one `KataConfig`.
///
/// Created per reconciliation from the object the watcher delivered, so
/// unchanged conditions are detected without another read.
pub struct KataConfigConditionReporter {
    api: Api<KataConfig>,
    name: String,
    conditions: Mutex<Vec<KataConfigCondition>>,
}

impl KataConfigConditionReporter {
    /// Reporter for `kata_config`, seeded with its current conditions.
    pub fn new(api: Api<KataConfig>, kata_config: &KataConfig) -> Self {
        Self {
            api,
            name: kata_config.metadata.name.clone().unwrap_or_default(),
            conditions: Mutex::new(
                kata_config
                    .status
                    .as_ref()
                    .map(|s| s.conditions.clone())
                    .unwrap_or_default(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl ConditionReporter for KataConfigConditionReporter {
    async fn report(&self, progress: ProgressCondition) {
        let updated = {
            let Ok(current) = self.conditions.lock() else {
                warn!("Condition cache for KataConfig {} is poisoned", self.name);
                return;
            };
            let mut updated = current.clone();
            if !upsert_condition(&mut updated, in_progress_condition(progress)) {
                debug!("KataConfig {} already reports {}", self.name, progress);
                return;
            }
            updated
        };

        let patch = serde_json::json!({
            "status": {
                "conditions": updated,
            }
        });
        match self
            .api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!("KataConfig {} condition set to {}", self.name, progress);
                if let Ok(mut current) = self.conditions.lock() {
                    *current = updated;
                }
            }
            Err(e) => warn!("Failed to set condition {} on KataConfig {}: {}", progress, self.name, e),
        }
    }
}
