//! Operator feature gates.
//!
//! Gates are read from the `osc-feature-gates` ConfigMap in the operator
//! namespace. A missing ConfigMap or key leaves the gate disabled.

use podvm_image::{get_optional, ConfigMapClientTrait, ResourceError};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Name of the feature gate ConfigMap
pub const FEATURE_GATES_CM_NAME: &str = "osc-feature-gates";

/// Key of the confidential computing gate
pub const CONFIDENTIAL_GATE: &str = "confidential";

/// Desired state of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureGateState {
    /// The feature should be provisioned
    Enabled,
    /// The feature should be removed or never set up
    #[default]
    Disabled,
}

impl fmt::Display for FeatureGateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => f.write_str("Enabled"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Snapshot of the operator feature gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureGates {
    /// Confidential computing for peer pods
    pub confidential: FeatureGateState,
}

impl FeatureGates {
    /// Builds the gates from ConfigMap data.
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        Self {
            confidential: parse_gate(CONFIDENTIAL_GATE, data.get(CONFIDENTIAL_GATE)),
        }
    }

    /// Reads the gates from the cluster.
    pub async fn load(
        config_maps: &dyn ConfigMapClientTrait,
        namespace: &str,
    ) -> Result<Self, ResourceError> {
        Ok(get_optional(config_maps, FEATURE_GATES_CM_NAME, namespace)
            .await?
            .map(|cm| Self::from_data(&cm.data))
            .unwrap_or_default())
    }
}

fn parse_gate(name: &str, value: Option<&String>) -> FeatureGateState {
    let Some(value) = value else {
        return FeatureGateState::Disabled;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => FeatureGateState::Enabled,
        "false" | "" => FeatureGateState::Disabled,
        other => {
            warn!("Feature gate {} has unrecognised value '{}', treating as disabled", name, other);
            FeatureGateState::Disabled
        }
    }
}
