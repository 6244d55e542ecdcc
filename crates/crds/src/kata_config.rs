//! KataConfig CRD
//!
//! Cluster-scoped resource describing how sandboxed containers are installed.
//! The confidential controller reconciles it and reports image preparation
//! progress through its `InProgress` status condition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type used for every progress report.
pub const IN_PROGRESS_CONDITION: &str = "InProgress";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "kataconfiguration.openshift.io",
    version = "v1",
    kind = "KataConfig",
    status = "KataConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KataConfigSpec {
    /// Install the peer pods (remote hypervisor) runtime
    #[serde(default)]
    pub enable_peer_pods: bool,

    /// Log level for the sandboxed containers runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KataConfigStatus {
    /// Status conditions, at most one per type
    #[serde(default)]
    pub conditions: Vec<KataConfigCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KataConfigCondition {
    /// Condition type (e.g. "InProgress")
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason, PascalCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl KataConfigCondition {
    /// Returns true when `other` would not change anything visible except the timestamp.
    pub fn same_state(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
