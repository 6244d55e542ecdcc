//! Controller-specific error types.
//!
//! This module defines error types specific to the confidential controller
//! that are not covered by upstream library errors. Collaborator errors are
//! wrapped unchanged so the scheduler logs the underlying cause.

use kube::Error as KubeError;
use podvm_image::{ImageError, ResourceError};
use thiserror::Error;

/// Errors that can occur in the confidential controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// ConfigMap read or write failed
    #[error("ConfigMap error: {0}")]
    Resource(#[from] ResourceError),

    /// Image generator or preconfiguration error
    #[error("Pod VM image error: {0}")]
    Image(#[from] ImageError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Probe server could not bind or serve
    #[error("Probe server error: {0}")]
    ProbeServer(#[from] std::io::Error),
}
