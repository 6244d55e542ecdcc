//! Pod VM image errors

use thiserror::Error;

/// Errors returned by the ConfigMap access layer
///
/// `NotFound` is kept distinct so callers can decide whether an absent
/// resource is a legitimate state or a failure.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create was attempted on a resource that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The API server refused the request (validation, conflict, permissions)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Transport or unexpected Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl ResourceError {
    /// True for the "resource does not exist" kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classifies a kube error for the resource `name`.
    pub(crate) fn from_kube(err: kube::Error, name: &str) -> Self {
        match err {
            kube::Error::Api(ref status) if status.code == 404 => {
                Self::NotFound(name.to_string())
            }
            kube::Error::Api(ref status) if status.code == 409 && status.reason == "AlreadyExists" => {
                Self::AlreadyExists(name.to_string())
            }
            kube::Error::Api(ref status) if (400..500).contains(&status.code) => {
                Self::Rejected(format!("{}: {}", name, status.message))
            }
            other => Self::Kube(other),
        }
    }
}

/// Errors raised by the image generator and the preconfiguration subsystem
#[derive(Debug, Error)]
pub enum ImageError {
    /// ConfigMap or Job access failed
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Cloud provider could not be determined
    #[error("Cloud provider detection failed: {0}")]
    ProviderDetection(String),

    /// A template file exists but could not be used
    #[error("Invalid template {path}: {reason}")]
    Template { path: String, reason: String },

    /// Template file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Preconfiguration reported a failure
    #[error("Preconfiguration failed: {0}")]
    Preconfiguration(String),
}
