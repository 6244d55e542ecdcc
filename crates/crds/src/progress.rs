//! Progress conditions reported while the pod VM image is prepared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons carried by the `InProgress` condition of a `KataConfig`.
///
/// Serializes as PascalCase to match the reasons already written by earlier
/// operator releases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProgressCondition {
    /// Image preconfiguration finished
    #[serde(rename = "PodVMImagePreConfigured")]
    ImagePreConfigured,

    /// The cloud provider has no confidential image support
    #[serde(rename = "PodVMImageConfigUnsupportedProvider")]
    ConfigUnsupportedProvider,

    /// Preconfiguration still running
    #[serde(rename = "PodVMPreConfiguring")]
    PreConfiguring,

    /// The image creation job failed
    #[serde(rename = "PodVMImageCreationFailed")]
    ImageCreationFailed,

    /// Preconfiguration status could not be determined
    #[serde(rename = "PodVMPreConfigurationUnknown")]
    PreConfigurationUnknown,
}

impl ProgressCondition {
    /// Condition reason string
    pub fn reason(self) -> &'static str {
        match self {
            Self::ImagePreConfigured => "PodVMImagePreConfigured",
            Self::ConfigUnsupportedProvider => "PodVMImageConfigUnsupportedProvider",
            Self::PreConfiguring => "PodVMPreConfiguring",
            Self::ImageCreationFailed => "PodVMImageCreationFailed",
            Self::PreConfigurationUnknown => "PodVMPreConfigurationUnknown",
        }
    }

    /// Human-readable condition message
    pub fn message(self) -> &'static str {
        match self {
            Self::ImagePreConfigured => "Pod VM image pre-configured",
            Self::ConfigUnsupportedProvider => {
                "Pod VM image configuration is not supported on this cloud provider"
            }
            Self::PreConfiguring => "Pre-configuring pod VM image",
            Self::ImageCreationFailed => "Pod VM image creation failed",
            Self::PreConfigurationUnknown => "Pod VM image pre-configuration status unknown",
        }
    }

    /// Condition status: failures are "False", pending work is "Unknown"
    pub fn status(self) -> &'static str {
        match self {
            Self::ImagePreConfigured | Self::PreConfiguring => "True",
            Self::ConfigUnsupportedProvider | Self::ImageCreationFailed => "False",
            Self::PreConfigurationUnknown => "Unknown",
        }
    }
}

impl fmt::Display for ProgressCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
